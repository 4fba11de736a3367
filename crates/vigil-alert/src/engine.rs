use crate::alert::{Alert, AlertState, NamedAlert};
use crate::definition::RuleDefinition;
use crate::error::{EvalError, Result, RuleError};
use crate::generator_url::prepare_rule_generator_url;
use crate::query::QueryProvider;
use crate::rules::build_evaluator;
use crate::{RuleEvaluator, RuleHealth, Verdict, RESOLVED_RETENTION, TEST_ALERT_POSTFIX};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_common::duration::Duration;
use vigil_common::types::{Labels, Series};

pub const ALERT_NAME_LABEL: &str = "alertname";
pub const RULE_ID_LABEL: &str = "ruleId";

/// Resolved alerts stay valid for this many evaluation or resend periods.
const VALIDITY_FACTOR: u32 = 4;

struct Candidate {
    fingerprint: u64,
    labels: Labels,
    query_result_labels: Labels,
    value: f64,
    missing: bool,
}

/// What one pass over the query results found.
#[derive(Default)]
struct Observation {
    matched: Vec<Candidate>,
    skipped: HashSet<u64>,
    has_data: bool,
}

/// A rule together with the alerts it currently tracks.
///
/// The alert table is keyed by label fingerprint and only ever mutated by
/// the task that owns the rule, one complete cycle at a time.
pub struct Rule {
    id: String,
    definition: RuleDefinition,
    evaluator: Box<dyn RuleEvaluator>,
    generator_url: String,
    selected_query: String,
    absent_for: chrono::Duration,
    active: BTreeMap<u64, Alert>,
    health: RuleHealth,
    last_error: Option<String>,
    last_evaluation: Option<DateTime<Utc>>,
    evaluation_duration: std::time::Duration,
    last_data_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Validates `definition` and builds its evaluator.
    pub fn new(id: impl Into<String>, definition: RuleDefinition) -> Result<Self> {
        definition.validate()?;
        let evaluator = build_evaluator(&definition)?;
        let id = id.into();
        let generator_url = prepare_rule_generator_url(&id, &definition.source);
        let selected_query = definition.condition.selected_query_name();
        let absent_for = absent_duration(definition.condition.absent_for);
        Ok(Self {
            id,
            definition,
            evaluator,
            generator_url,
            selected_query,
            absent_for,
            active: BTreeMap::new(),
            health: RuleHealth::Unknown,
            last_error: None,
            last_evaluation: None,
            evaluation_duration: std::time::Duration::ZERO,
            last_data_at: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    pub fn health(&self) -> RuleHealth {
        self.health
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn evaluation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_evaluation
    }

    pub fn evaluation_duration(&self) -> std::time::Duration {
        self.evaluation_duration
    }

    pub fn generator_url(&self) -> &str {
        &self.generator_url
    }

    /// Name of the sub-query whose series are evaluated. Empty means every
    /// returned series.
    pub fn selected_query(&self) -> &str {
        &self.selected_query
    }

    /// Alerts currently tracked, in fingerprint order.
    pub fn active_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.active.values()
    }

    /// Query range `[start, end]` for a cycle at `now`.
    pub fn query_range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let lookback = self.evaluator.lookback(self.definition.eval_window);
        (now - lookback.to_chrono(), now)
    }

    /// Fetches the rule's query results, racing the fetch against `cancel`
    /// and `timeout`. Nothing about the rule is changed here.
    async fn fetch(
        &self,
        provider: &dyn QueryProvider,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> std::result::Result<Vec<Series>, EvalError> {
        let query = self
            .definition
            .condition
            .composite_query
            .as_ref()
            .ok_or(RuleError::CompositeQueryRequired)?;
        let (start, end) = self.query_range(now);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EvalError::Cancelled),
            res = tokio::time::timeout(timeout.as_std(), provider.query_range(query, start, end)) => {
                match res {
                    Ok(Ok(series)) => Ok(series),
                    Ok(Err(e)) => Err(EvalError::Query(e)),
                    Err(_) => Err(EvalError::Timeout(timeout)),
                }
            }
        }
    }

    /// Runs one evaluation cycle and returns the number of tracked alerts.
    ///
    /// On failure the alert table is left exactly as it was. Query errors
    /// and timeouts mark the rule unhealthy; cancellation does not.
    pub async fn eval(
        &mut self,
        provider: &dyn QueryProvider,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> std::result::Result<usize, EvalError> {
        let started = Instant::now();
        let result = self.fetch(provider, now, cancel, timeout).await;
        self.evaluation_duration = started.elapsed();
        self.last_evaluation = Some(now);

        match result {
            Ok(series) => {
                let count = self.apply(&series, now);
                self.health = RuleHealth::Good;
                self.last_error = None;
                Ok(count)
            }
            Err(EvalError::Cancelled) => {
                tracing::debug!(rule_id = %self.id, "Evaluation cancelled");
                Err(EvalError::Cancelled)
            }
            Err(e) => {
                tracing::warn!(rule_id = %self.id, error = %e, "Evaluation failed, keeping previous alert state");
                self.health = RuleHealth::Bad;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Advances the alert table with one cycle's query results and returns
    /// the number of tracked alerts.
    pub fn apply(&mut self, series: &[Series], now: DateTime<Utc>) -> usize {
        let observation = self.observe(series, now, self.name());
        if observation.has_data {
            self.last_data_at = Some(now);
        }

        let mut matched = HashSet::with_capacity(observation.matched.len());
        for candidate in observation.matched {
            let fp = candidate.fingerprint;
            matched.insert(fp);
            if let Some(alert) = self
                .active
                .get_mut(&fp)
                .filter(|a| a.state != AlertState::Resolved)
            {
                alert.value = candidate.value;
                alert.query_result_labels = candidate.query_result_labels;
                alert.missing = candidate.missing;
                continue;
            }
            // A resolved alert whose labels match again starts a new lifecycle.
            let alert = self.new_alert(candidate, now);
            tracing::debug!(rule_id = %self.id, labels = %alert.labels, "Alert pending");
            self.active.insert(fp, alert);
        }

        let hold = self.definition.hold_duration.to_chrono();
        let retention = RESOLVED_RETENTION.to_chrono();
        let rule_id = &self.id;
        self.active.retain(|fp, alert| {
            if alert.state == AlertState::Resolved {
                return alert.resolved_at.is_some_and(|r| now - r <= retention);
            }
            if observation.skipped.contains(fp) {
                return true;
            }
            if matched.contains(fp) {
                if alert.state == AlertState::Pending && now - alert.active_at >= hold {
                    alert.state = AlertState::Firing;
                    alert.fired_at = Some(now);
                    tracing::info!(rule_id = %rule_id, labels = %alert.labels, value = alert.value, "Alert firing");
                }
                return true;
            }
            match alert.state {
                AlertState::Firing => {
                    alert.state = AlertState::Resolved;
                    alert.resolved_at = Some(now);
                    tracing::info!(rule_id = %rule_id, labels = %alert.labels, "Alert resolved");
                    true
                }
                AlertState::Resolved | AlertState::Pending | AlertState::Inactive => false,
            }
        });

        self.active.len()
    }

    /// Marks every alert that needs sending as sent and returns them for
    /// dispatch.
    pub fn alerts_to_send(&mut self, now: DateTime<Utc>, resend_delay: Duration) -> Vec<NamedAlert> {
        let valid_for = Duration::from(
            self.definition.frequency.as_std().max(resend_delay.as_std()) * VALIDITY_FACTOR,
        );
        let name = self.definition.name.clone();
        self.active
            .values_mut()
            .filter(|alert| alert.needs_sending(now, resend_delay))
            .map(|alert| {
                alert.mark_sent(now, valid_for);
                NamedAlert {
                    name: name.clone(),
                    alert: alert.clone(),
                }
            })
            .collect()
    }

    /// Evaluates the rule once without touching its alert table.
    ///
    /// Every match is returned as a firing alert named with
    /// [`TEST_ALERT_POSTFIX`], ignoring the hold duration and the resend
    /// cadence.
    pub async fn test_eval(
        &self,
        provider: &dyn QueryProvider,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> std::result::Result<Vec<NamedAlert>, EvalError> {
        let series = self.fetch(provider, now, cancel, timeout).await?;
        let name = format!("{}{TEST_ALERT_POSTFIX}", self.name());
        let observation = self.observe(&series, now, &name);

        Ok(observation
            .matched
            .into_iter()
            .map(|candidate| {
                let mut alert = self.new_alert(candidate, now);
                alert.state = AlertState::Firing;
                alert.fired_at = Some(now);
                alert.last_sent_at = Some(now);
                NamedAlert {
                    name: name.clone(),
                    alert,
                }
            })
            .collect())
    }

    fn observe(&self, series: &[Series], now: DateTime<Utc>, alert_name: &str) -> Observation {
        let window_start = now - self.definition.eval_window.to_chrono();
        let mut observation = Observation::default();

        for s in series.iter().filter(|s| s.is_from_query(&self.selected_query)) {
            if !s.points_since(window_start).is_empty() {
                observation.has_data = true;
            }
            let labels = self.alert_labels(&s.labels, alert_name);
            let fingerprint = labels.fingerprint();
            match self.evaluator.evaluate(s, window_start) {
                Verdict::Matched(value) => observation.matched.push(Candidate {
                    fingerprint,
                    labels,
                    query_result_labels: s.labels.clone(),
                    value,
                    missing: false,
                }),
                Verdict::Skipped => {
                    observation.skipped.insert(fingerprint);
                }
                Verdict::NotMatched => {}
            }
        }

        let condition = &self.definition.condition;
        if condition.alert_on_absent && !observation.has_data {
            let absent_long_enough = self
                .last_data_at
                .map_or(true, |seen| now - seen >= self.absent_for);
            if absent_long_enough {
                let labels = self.alert_labels(&Labels::new(), alert_name);
                observation.matched.push(Candidate {
                    fingerprint: labels.fingerprint(),
                    labels,
                    query_result_labels: Labels::new(),
                    value: 0.0,
                    missing: true,
                });
            }
        }

        observation
    }

    fn alert_labels(&self, series_labels: &Labels, alert_name: &str) -> Labels {
        let mut labels = series_labels.merged(&self.definition.labels);
        labels.insert(ALERT_NAME_LABEL, alert_name);
        labels.insert(RULE_ID_LABEL, self.id.as_str());
        labels
    }

    fn new_alert(&self, candidate: Candidate, now: DateTime<Utc>) -> Alert {
        let mut alert = Alert::pending(
            candidate.labels,
            candidate.query_result_labels,
            candidate.value,
            now,
        );
        alert.annotations = self.definition.annotations.clone();
        alert.generator_url = self.generator_url.clone();
        alert.receivers = self.definition.preferred_channels.clone();
        alert.missing = candidate.missing;
        alert
    }
}

/// `absentFor` minutes as a duration, saturating at the largest
/// representable one.
fn absent_duration(minutes: u64) -> chrono::Duration {
    i64::try_from(minutes)
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .unwrap_or(chrono::Duration::MAX)
}
