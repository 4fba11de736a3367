use crate::condition::RuleCondition;
use crate::error::{Result, RuleError};
use crate::operators::{CompareOp, MatchType};
use crate::window::match_window;
use crate::{RuleEvaluator, RuleType, Verdict};
use chrono::{DateTime, Utc};
use vigil_common::types::{Sample, Series};

/// Target, operator and reduction taken from a rule condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub target: f64,
    pub op: CompareOp,
    pub match_type: MatchType,
}

impl Threshold {
    /// Reads the threshold from `condition`.
    ///
    /// Returns `Ok(None)` when neither a target nor an operator is set, which
    /// is how free-form queries declare that they filter on their own. A
    /// partially configured threshold is an error.
    pub fn from_condition(condition: &RuleCondition) -> Result<Option<Self>> {
        if condition.target.is_none() && condition.compare_op.is_none() {
            return Ok(None);
        }
        let target = condition.target.ok_or(RuleError::TargetRequired)?;
        let op = condition.compare_op.ok_or(RuleError::CompareOpRequired)?;
        op.validate()?;
        let match_type = condition.match_type.ok_or(RuleError::MatchTypeRequired)?;
        match_type.validate()?;
        Ok(Some(Self {
            target,
            op,
            match_type,
        }))
    }

    pub fn check(&self, values: &[f64]) -> Option<f64> {
        match_window(values, self.match_type, self.op, self.target)
    }
}

pub(crate) fn values(points: &[Sample]) -> Vec<f64> {
    points.iter().map(|p| p.value).collect()
}

/// Evaluates a window with an optional threshold. Without one, any window
/// holding data matches with its latest value.
pub(crate) fn evaluate_window(
    threshold: Option<&Threshold>,
    window: &[Sample],
    min_points: Option<usize>,
) -> Verdict {
    if min_points.is_some_and(|min| window.len() < min) {
        return Verdict::Skipped;
    }

    let values = values(window);
    let matched = match threshold {
        Some(t) => t.check(&values),
        None => values.iter().rev().copied().find(|v| v.is_finite()),
    };

    match matched {
        Some(v) => Verdict::Matched(v),
        None => Verdict::NotMatched,
    }
}

/// Compares builder or SQL query results against a fixed target.
pub struct ThresholdRule {
    pub threshold: Option<Threshold>,
    pub min_points: Option<usize>,
}

impl ThresholdRule {
    pub fn from_condition(condition: &RuleCondition) -> Result<Self> {
        Ok(Self {
            threshold: Threshold::from_condition(condition)?,
            min_points: condition.min_points(),
        })
    }
}

impl RuleEvaluator for ThresholdRule {
    fn rule_type(&self) -> RuleType {
        RuleType::Threshold
    }

    fn evaluate(&self, series: &Series, window_start: DateTime<Utc>) -> Verdict {
        evaluate_window(
            self.threshold.as_ref(),
            series.points_since(window_start),
            self.min_points,
        )
    }
}
