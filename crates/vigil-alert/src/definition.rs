use crate::condition::RuleCondition;
use crate::error::{Result, RuleError};
use crate::rules::anomaly::{Algorithm, Seasonality};
use crate::RuleType;
use serde::{Deserialize, Serialize};
use vigil_common::duration::Duration;
use vigil_common::query::QueryType;
use vigil_common::types::Labels;

fn default_eval_window() -> Duration {
    Duration::from_mins(5)
}

fn default_frequency() -> Duration {
    Duration::from_mins(1)
}

fn default_version() -> String {
    "v4".to_string()
}

/// A rule as submitted by the API or read from a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Rule name, also used as the `alertname` label.
    #[serde(rename = "alert")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alert_type: String,

    /// Inferred from the query type when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<RuleType>,

    #[serde(default = "default_eval_window")]
    pub eval_window: Duration,

    #[serde(default = "default_frequency")]
    pub frequency: Duration,

    /// How long the condition must hold before a pending alert fires.
    #[serde(rename = "for", default)]
    pub hold_duration: Duration,

    pub condition: RuleCondition,

    #[serde(default)]
    pub labels: Labels,

    #[serde(default)]
    pub annotations: Labels,

    #[serde(default)]
    pub disabled: bool,

    /// UI location the rule was created from; feeds the generator URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_channels: Vec<String>,

    #[serde(default = "default_version")]
    pub version: String,
}

impl RuleDefinition {
    pub fn effective_rule_type(&self) -> RuleType {
        self.rule_type.unwrap_or_else(|| match self.condition.query_type() {
            QueryType::PromQl => RuleType::Prom,
            _ => RuleType::Threshold,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RuleError::InvalidDefinition("alert name is required".into()));
        }
        if self.eval_window.is_zero() {
            return Err(RuleError::InvalidDefinition(
                "evalWindow must be greater than zero".into(),
            ));
        }
        if self.frequency.is_zero() {
            return Err(RuleError::InvalidDefinition(
                "frequency must be greater than zero".into(),
            ));
        }

        self.condition.validate()?;

        let query_type = self.condition.query_type();
        let rule_type = self.effective_rule_type();
        let compatible = match rule_type {
            RuleType::Threshold => {
                matches!(query_type, QueryType::Builder | QueryType::ClickHouseSql)
            }
            RuleType::Prom => query_type == QueryType::PromQl,
            RuleType::Anomaly => query_type == QueryType::Builder,
        };
        if !compatible {
            return Err(RuleError::InvalidDefinition(format!(
                "{rule_type} does not support {query_type} queries"
            )));
        }

        if rule_type == RuleType::Anomaly {
            self.condition.algorithm.parse::<Algorithm>()?;
            self.condition.seasonality.parse::<Seasonality>()?;
        }

        Ok(())
    }
}
