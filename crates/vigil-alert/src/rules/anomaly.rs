use super::threshold::{values, Threshold};
use crate::condition::RuleCondition;
use crate::error::{Result, RuleError};
use crate::window::mean_and_stddev;
use crate::{RuleEvaluator, RuleType, Verdict};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use vigil_common::duration::Duration;
use vigil_common::types::Series;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// z-score of each sample against the mean and standard deviation of
    /// the preceding season.
    Standard,
}

impl FromStr for Algorithm {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "standard" => Ok(Algorithm::Standard),
            other => Err(RuleError::InvalidAnomalyConfig(format!(
                "unknown algorithm {other:?}, supported: standard"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seasonality {
    Hourly,
    Daily,
    Weekly,
}

impl Seasonality {
    pub fn period(&self) -> Duration {
        match self {
            Seasonality::Hourly => Duration::from_mins(60),
            Seasonality::Daily => Duration::from_mins(24 * 60),
            Seasonality::Weekly => Duration::from_mins(7 * 24 * 60),
        }
    }
}

impl FromStr for Seasonality {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hourly" => Ok(Seasonality::Hourly),
            "" | "daily" => Ok(Seasonality::Daily),
            "weekly" => Ok(Seasonality::Weekly),
            other => Err(RuleError::InvalidAnomalyConfig(format!(
                "unknown seasonality {other:?}, supported: hourly, daily, weekly"
            ))),
        }
    }
}

/// Scores each window sample against the expected band learned from one
/// season of history and compares the scores with the target.
///
/// The target is therefore a z-score: `op: above, target: 3` fires when a
/// sample sits more than three standard deviations above the seasonal mean.
pub struct AnomalyRule {
    pub threshold: Threshold,
    pub algorithm: Algorithm,
    pub seasonality: Seasonality,
    pub min_points: Option<usize>,
}

impl AnomalyRule {
    pub fn from_condition(condition: &RuleCondition) -> Result<Self> {
        let threshold = Threshold::from_condition(condition)?.ok_or(RuleError::TargetRequired)?;
        Ok(Self {
            threshold,
            algorithm: condition.algorithm.parse()?,
            seasonality: condition.seasonality.parse()?,
            min_points: condition.min_points(),
        })
    }

    /// Converts `window` values to scores against `history`, or `None` when
    /// the history does not define a usable band.
    pub fn scores(&self, history: &[f64], window: &[f64]) -> Option<Vec<f64>> {
        match self.algorithm {
            Algorithm::Standard => {
                let (mean, stddev) = mean_and_stddev(history)?;
                if stddev <= f64::EPSILON {
                    return None;
                }
                Some(window.iter().map(|v| (v - mean) / stddev).collect())
            }
        }
    }
}

impl RuleEvaluator for AnomalyRule {
    fn rule_type(&self) -> RuleType {
        RuleType::Anomaly
    }

    fn lookback(&self, eval_window: Duration) -> Duration {
        Duration::from(eval_window.as_std() + self.seasonality.period().as_std())
    }

    fn evaluate(&self, series: &Series, window_start: DateTime<Utc>) -> Verdict {
        let window = series.points_since(window_start);
        if self.min_points.is_some_and(|min| window.len() < min) {
            return Verdict::Skipped;
        }

        let history = values(series.points_before(window_start));
        let Some(scores) = self.scores(&history, &values(window)) else {
            return Verdict::Skipped;
        };

        match self.threshold.check(&scores) {
            Some(score) => Verdict::Matched(score),
            None => Verdict::NotMatched,
        }
    }
}
