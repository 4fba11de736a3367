use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use vigil_alert::definition::RuleDefinition;
use vigil_alert::engine::Rule;

/// On-disk rule file: `{"rules": [<rule definition>, ...]}`.
///
/// Entries are kept as raw JSON so one malformed rule does not prevent the
/// others from loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub rules: Vec<serde_json::Value>,
}

/// Convert a single rule file entry into a validated [`Rule`].
///
/// Entries without an `id` are numbered by position (`rule-1`, `rule-2`, ...).
pub fn build_rule(index: usize, entry: &serde_json::Value) -> Result<Rule> {
    let definition: RuleDefinition = serde_json::from_value(entry.clone())
        .map_err(|e| anyhow::anyhow!("invalid rule definition: {e}"))?;
    let id = if definition.id.is_empty() {
        format!("rule-{}", index + 1)
    } else {
        definition.id.clone()
    };
    Rule::new(id, definition).map_err(|e| anyhow::anyhow!("{e}"))
}

/// Convert multiple entries into rules, skipping invalid ones and duplicate
/// ids with warnings.
pub fn build_rules(entries: &[serde_json::Value]) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(entries.len());
    let mut seen = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let name = entry.get("alert").and_then(|v| v.as_str()).unwrap_or("");
        match build_rule(index, entry) {
            Ok(rule) if !seen.insert(rule.id().to_string()) => {
                tracing::warn!(rule_id = %rule.id(), rule_name = %name, "Skipping alert rule with duplicate id");
            }
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(
                    index,
                    rule_name = %name,
                    error = %e,
                    "Skipping invalid alert rule"
                );
            }
        }
    }
    rules
}

/// Load and validate every rule in the JSON file at `path`.
pub fn load_rules_file(path: impl AsRef<Path>) -> Result<Vec<Rule>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read rules file '{}': {e}", path.display()))?;
    let file: RulesFile = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse rules file '{}': {e}", path.display()))?;

    let rules = build_rules(&file.rules);
    tracing::info!(
        path = %path.display(),
        rule_count = rules.len(),
        skipped = file.rules.len() - rules.len(),
        "Alert rules loaded"
    );
    Ok(rules)
}
