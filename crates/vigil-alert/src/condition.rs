use crate::error::{Result, RuleError};
use crate::operators::{empty_as_none, CompareOp, MatchType};
use serde::{Deserialize, Serialize};
use vigil_common::query::{CompositeQuery, QueryType};

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Declarative evaluation settings of a rule.
///
/// The JSON shape is shared with previously persisted rules: every field
/// except `compositeQuery` is omitted when empty, and the operators are
/// written as their single-digit codes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default)]
    pub composite_query: Option<CompositeQuery>,

    #[serde(
        rename = "op",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub compare_op: Option<CompareOp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub alert_on_absent: bool,

    /// Minutes without data before an absence alert is raised.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub absent_for: u64,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub match_type: Option<MatchType>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_unit: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub algorithm: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub seasonality: String,

    #[serde(
        rename = "selectedQueryName",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub selected_query: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub require_min_points: bool,

    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub required_num_points: u32,
}

impl RuleCondition {
    /// Query type of the attached composite query, or `Unknown` without one.
    pub fn query_type(&self) -> QueryType {
        self.composite_query
            .as_ref()
            .map(|q| q.query_type)
            .unwrap_or_default()
    }

    /// Resolves which sub-query's result the rule evaluates.
    ///
    /// An explicit selection always wins. Otherwise, for rules created
    /// before the selection existed, `F1` is preferred and then the
    /// lexicographically greatest name. The fallback does not look at
    /// whether a sub-query is disabled; existing rules rely on it as is.
    pub fn selected_query_name(&self) -> String {
        if !self.selected_query.is_empty() {
            return self.selected_query.clone();
        }

        let names: Vec<&String> = match &self.composite_query {
            Some(q) if q.query_type == QueryType::Builder => q.builder_queries.keys().collect(),
            Some(q) if q.query_type == QueryType::ClickHouseSql => {
                q.clickhouse_queries.keys().collect()
            }
            _ => Vec::new(),
        };

        if names.iter().any(|n| n.as_str() == "F1") {
            return "F1".to_string();
        }

        names
            .into_iter()
            .max()
            .cloned()
            .unwrap_or_default()
    }

    /// Checks the condition before it is persisted.
    ///
    /// Target and operators are only required for builder queries; the
    /// free-form query languages encode their own thresholding.
    pub fn validate(&self) -> Result<()> {
        let query = self
            .composite_query
            .as_ref()
            .ok_or(RuleError::CompositeQueryRequired)?;

        if query.query_type == QueryType::Builder {
            if self.target.is_none() {
                return Err(RuleError::TargetRequired);
            }
            self.compare_op
                .ok_or(RuleError::CompareOpRequired)?
                .validate()?;
            self.match_type
                .ok_or(RuleError::MatchTypeRequired)?
                .validate()?;
        }

        query.validate()?;
        Ok(())
    }

    /// Minimum number of window points required before a series is
    /// evaluated, if gating is enabled.
    pub fn min_points(&self) -> Option<usize> {
        (self.require_min_points && self.required_num_points > 0)
            .then_some(self.required_num_points as usize)
    }
}

impl std::fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Ok(()),
        }
    }
}
