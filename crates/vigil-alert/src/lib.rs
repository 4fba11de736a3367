//! Alert rule evaluation for composite telemetry queries.
//!
//! A [`engine::Rule`] owns one rule definition and the table of alerts it
//! produced. Each evaluation cycle fetches series from a
//! [`query::QueryProvider`], lets the rule's [`RuleEvaluator`] decide which
//! series satisfy the condition, and advances every alert through the
//! pending / firing / resolved lifecycle. Built-in evaluators cover
//! threshold, PromQL and anomaly rules.

pub mod alert;
pub mod condition;
pub mod definition;
pub mod engine;
pub mod error;
pub mod generator_url;
pub mod operators;
pub mod query;
pub mod rules;
pub mod window;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_common::duration::Duration;
use vigil_common::types::Series;

/// How long a resolved alert is retained, and so re-announced, before it
/// is dropped from the rule's alert table.
pub const RESOLVED_RETENTION: Duration = Duration::from_mins(15);

/// Appended to the rule name of alerts raised by a test evaluation.
pub const TEST_ALERT_POSTFIX: &str = "_TEST_ALERT";

/// Evaluation strategy of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleType {
    #[serde(rename = "threshold_rule")]
    Threshold,
    #[serde(rename = "promql_rule")]
    Prom,
    #[serde(rename = "anomaly_rule")]
    Anomaly,
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleType::Threshold => write!(f, "threshold_rule"),
            RuleType::Prom => write!(f, "promql_rule"),
            RuleType::Anomaly => write!(f, "anomaly_rule"),
        }
    }
}

/// Health of a rule's own evaluation pipeline, independent of its alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleHealth {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "ok")]
    Good,
    #[serde(rename = "err")]
    Bad,
}

/// Outcome of evaluating one series for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// The condition holds; carries the value reported on the alert.
    Matched(f64),
    /// The condition does not hold.
    NotMatched,
    /// Not enough data to decide; the series' alert is left untouched.
    Skipped,
}

/// Decides, per series, whether a rule's condition holds.
///
/// Implementations are built from a validated
/// [`definition::RuleDefinition`] by [`rules::build_evaluator`] and are
/// immutable for the lifetime of the rule.
pub trait RuleEvaluator: Send + Sync {
    fn rule_type(&self) -> RuleType;

    /// How far before `now` the query range has to start for a cycle
    /// whose evaluation window is `eval_window`.
    fn lookback(&self, eval_window: Duration) -> Duration {
        eval_window
    }

    /// Evaluates one series. Points before `window_start` are history the
    /// evaluator may use but must not match on.
    fn evaluate(&self, series: &Series, window_start: DateTime<Utc>) -> Verdict;
}
