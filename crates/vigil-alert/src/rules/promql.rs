use super::threshold::{evaluate_window, Threshold};
use crate::condition::RuleCondition;
use crate::error::Result;
use crate::{RuleEvaluator, RuleType, Verdict};
use chrono::{DateTime, Utc};
use vigil_common::types::Series;

/// Passes a raw PromQL query through.
///
/// Every returned series is a match unless the condition also carries a
/// target and operator, in which case they apply as for threshold rules.
pub struct PromRule {
    pub threshold: Option<Threshold>,
    pub min_points: Option<usize>,
}

impl PromRule {
    pub fn from_condition(condition: &RuleCondition) -> Result<Self> {
        Ok(Self {
            threshold: Threshold::from_condition(condition)?,
            min_points: condition.min_points(),
        })
    }
}

impl RuleEvaluator for PromRule {
    fn rule_type(&self) -> RuleType {
        RuleType::Prom
    }

    fn evaluate(&self, series: &Series, window_start: DateTime<Utc>) -> Verdict {
        evaluate_window(
            self.threshold.as_ref(),
            series.points_since(window_start),
            self.min_points,
        )
    }
}
