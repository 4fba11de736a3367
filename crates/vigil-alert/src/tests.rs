use crate::alert::AlertState;
use crate::definition::RuleDefinition;
use crate::engine::{Rule, ALERT_NAME_LABEL, RULE_ID_LABEL};
use crate::error::EvalError;
use crate::query::{QueryError, QueryProvider};
use crate::{RuleHealth, TEST_ALERT_POSTFIX};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use vigil_common::duration::Duration;
use vigil_common::query::CompositeQuery;
use vigil_common::types::{Labels, Sample, Series};

const TIMEOUT: Duration = Duration::from_secs(5);
const RESEND: Duration = Duration::from_mins(5);

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn series(host: &str, points: &[(i64, f64)]) -> Series {
    Series::new(
        Labels::from_pairs([("host", host)]),
        points
            .iter()
            .map(|&(secs, value)| Sample {
                timestamp: at(secs),
                value,
            })
            .collect(),
    )
}

fn definition(extra: serde_json::Value) -> RuleDefinition {
    let mut base = serde_json::json!({
        "alert": "High CPU",
        "evalWindow": "5m",
        "frequency": "1m",
        "for": "2m",
        "condition": {
            "compositeQuery": {
                "queryType": "builder",
                "builderQueries": { "A": { "queryName": "A", "expression": "A" } }
            },
            "op": "1",
            "target": 80,
            "matchType": "1"
        },
        "labels": { "severity": "critical" },
        "annotations": { "summary": "cpu is high" },
        "preferredChannels": ["ops"],
        "source": "https://vigil.example.com/alerts/new"
    });
    merge(&mut base, extra);
    serde_json::from_value(base).unwrap()
}

fn merge(base: &mut serde_json::Value, extra: serde_json::Value) {
    match (base, extra) {
        (serde_json::Value::Object(b), serde_json::Value::Object(e)) => {
            for (k, v) in e {
                if v.is_null() {
                    b.remove(&k);
                } else {
                    merge(b.entry(k).or_insert(serde_json::Value::Null), v);
                }
            }
        }
        (b, e) => *b = e,
    }
}

fn rule(extra: serde_json::Value) -> Rule {
    Rule::new("rule-1", definition(extra)).unwrap()
}

fn only_alert(rule: &Rule) -> &crate::alert::Alert {
    let alerts: Vec<_> = rule.active_alerts().collect();
    assert_eq!(alerts.len(), 1, "expected exactly one alert");
    alerts[0]
}

struct StaticProvider {
    series: Vec<Series>,
    range: Mutex<Option<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl StaticProvider {
    fn new(series: Vec<Series>) -> Self {
        Self {
            series,
            range: Mutex::new(None),
        }
    }
}

#[async_trait]
impl QueryProvider for StaticProvider {
    async fn query_range(
        &self,
        _query: &CompositeQuery,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Series>, QueryError> {
        *self.range.lock().unwrap() = Some((start, end));
        Ok(self.series.clone())
    }
}

struct FailingProvider;

#[async_trait]
impl QueryProvider for FailingProvider {
    async fn query_range(
        &self,
        _query: &CompositeQuery,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Series>, QueryError> {
        Err(QueryError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }
}

struct HangingProvider;

#[async_trait]
impl QueryProvider for HangingProvider {
    async fn query_range(
        &self,
        _query: &CompositeQuery,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Series>, QueryError> {
        std::future::pending().await
    }
}

#[test]
fn alert_goes_pending_then_firing_after_hold() {
    let mut rule = rule(serde_json::json!({}));

    assert_eq!(rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0)), 1);
    assert_eq!(only_alert(&rule).state, AlertState::Pending);
    assert_eq!(only_alert(&rule).active_at, at(0));

    rule.apply(&[series("web-01", &[(30, 91.0)])], at(60));
    assert_eq!(only_alert(&rule).state, AlertState::Pending);
    assert_eq!(only_alert(&rule).value, 91.0);

    rule.apply(&[series("web-01", &[(90, 92.0)])], at(120));
    let alert = only_alert(&rule);
    assert_eq!(alert.state, AlertState::Firing);
    assert_eq!(alert.fired_at, Some(at(120)));
    assert_eq!(alert.active_at, at(0));
}

#[test]
fn alert_labels_carry_rule_metadata() {
    let mut rule = rule(serde_json::json!({}));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));

    let alert = only_alert(&rule);
    assert_eq!(alert.labels.get("host"), Some("web-01"));
    assert_eq!(alert.labels.get("severity"), Some("critical"));
    assert_eq!(alert.labels.get(ALERT_NAME_LABEL), Some("High CPU"));
    assert_eq!(alert.labels.get(RULE_ID_LABEL), Some("rule-1"));
    assert_eq!(alert.query_result_labels.len(), 1);
    assert_eq!(alert.annotations.get("summary"), Some("cpu is high"));
    assert_eq!(alert.receivers, vec!["ops".to_string()]);
    assert_eq!(
        alert.generator_url,
        "https://vigil.example.com/alerts/edit?ruleId=rule-1"
    );
}

#[test]
fn pending_alert_is_dropped_when_condition_clears() {
    let mut rule = rule(serde_json::json!({}));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));
    assert_eq!(rule.apply(&[series("web-01", &[(30, 10.0)])], at(60)), 0);
}

#[test]
fn firing_alert_resolves_and_expires_after_retention() {
    let mut rule = rule(serde_json::json!({ "for": "0s" }));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));
    assert_eq!(only_alert(&rule).state, AlertState::Firing);

    rule.apply(&[series("web-01", &[(30, 10.0)])], at(60));
    let alert = only_alert(&rule);
    assert_eq!(alert.state, AlertState::Resolved);
    assert_eq!(alert.resolved_at, Some(at(60)));

    // Retained for the full retention period, then dropped.
    assert_eq!(rule.apply(&[], at(60 + 15 * 60)), 1);
    assert_eq!(rule.apply(&[], at(60 + 16 * 60)), 0);
}

#[test]
fn resolved_alert_matching_again_starts_over() {
    let mut rule = rule(serde_json::json!({}));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));
    rule.apply(&[series("web-01", &[(100, 95.0)])], at(120));
    rule.apply(&[series("web-01", &[(150, 10.0)])], at(180));
    assert_eq!(only_alert(&rule).state, AlertState::Resolved);

    rule.apply(&[series("web-01", &[(230, 99.0)])], at(240));
    let alert = only_alert(&rule);
    assert_eq!(alert.state, AlertState::Pending);
    assert_eq!(alert.active_at, at(240));
    assert_eq!(alert.resolved_at, None);
}

#[test]
fn series_are_tracked_independently() {
    let mut rule = rule(serde_json::json!({ "for": "0s" }));
    let count = rule.apply(
        &[
            series("web-01", &[(-30, 95.0)]),
            series("web-02", &[(-30, 20.0)]),
            series("web-03", &[(-30, 85.0)]),
        ],
        at(0),
    );
    assert_eq!(count, 2);
    let hosts: Vec<_> = rule
        .active_alerts()
        .filter_map(|a| a.labels.get("host").map(str::to_string))
        .collect();
    assert!(hosts.contains(&"web-01".to_string()));
    assert!(hosts.contains(&"web-03".to_string()));
}

#[test]
fn match_type_selects_reported_value() {
    let points = [(-240, 70.0), (-180, 90.0), (-120, 100.0), (-60, 85.0)];

    let mut at_least_once = rule(serde_json::json!({}));
    at_least_once.apply(&[series("a", &points)], at(0));
    assert_eq!(only_alert(&at_least_once).value, 90.0);

    let mut all_the_times = rule(serde_json::json!({ "condition": { "matchType": "2" } }));
    assert_eq!(all_the_times.apply(&[series("a", &points)], at(0)), 0);
    all_the_times.apply(&[series("a", &points[1..])], at(0));
    assert_eq!(only_alert(&all_the_times).value, 85.0);

    let mut on_average = rule(serde_json::json!({ "condition": { "matchType": "3" } }));
    on_average.apply(&[series("a", &points)], at(0));
    assert_eq!(only_alert(&on_average).value, 86.25);

    let mut in_total = rule(serde_json::json!({
        "condition": { "matchType": "4", "target": 300 }
    }));
    in_total.apply(&[series("a", &points)], at(0));
    assert_eq!(only_alert(&in_total).value, 345.0);

    let mut last = rule(serde_json::json!({ "condition": { "matchType": "5" } }));
    last.apply(&[series("a", &points)], at(0));
    assert_eq!(only_alert(&last).value, 85.0);
}

#[test]
fn points_outside_eval_window_are_ignored() {
    let mut rule = rule(serde_json::json!({}));
    assert_eq!(rule.apply(&[series("web-01", &[(-600, 99.0), (-10, 50.0)])], at(0)), 0);
}

#[test]
fn too_few_points_leave_alert_untouched() {
    let mut rule = rule(serde_json::json!({
        "for": "0s",
        "condition": { "requireMinPoints": true, "requiredNumPoints": 3 }
    }));

    // Not enough points to create an alert.
    assert_eq!(rule.apply(&[series("web-01", &[(-60, 95.0), (-30, 96.0)])], at(0)), 0);

    rule.apply(
        &[series("web-01", &[(-90, 95.0), (-60, 95.0), (-30, 96.0)])],
        at(0),
    );
    assert_eq!(only_alert(&rule).state, AlertState::Firing);

    // A sparse cycle neither resolves nor updates the firing alert.
    rule.apply(&[series("web-01", &[(50, 10.0)])], at(60));
    let alert = only_alert(&rule);
    assert_eq!(alert.state, AlertState::Firing);
    assert_eq!(alert.value, 95.0);
}

#[test]
fn resolved_alert_expires_even_when_sparse() {
    let mut rule = rule(serde_json::json!({
        "for": "0s",
        "condition": { "requireMinPoints": true, "requiredNumPoints": 2 }
    }));
    rule.apply(&[series("web-01", &[(-60, 95.0), (-30, 96.0)])], at(0));
    rule.apply(&[series("web-01", &[(20, 10.0), (40, 12.0)])], at(60));
    assert_eq!(only_alert(&rule).state, AlertState::Resolved);
    rule.alerts_to_send(at(60), RESEND);

    // Single-point cycles are skipped but must not keep the resolution alive.
    let mut resent = 0;
    for minute in 2..=120 {
        let now = 60 * minute;
        rule.apply(&[series("web-01", &[(now - 10, 10.0)])], at(now));
        resent += rule.alerts_to_send(at(now), RESEND).len();
    }
    assert_eq!(rule.active_alerts().count(), 0);
    assert!(resent <= 3, "resolution re-sent {resent} times");
}

#[test]
fn only_selected_query_is_evaluated() {
    let mut rule = rule(serde_json::json!({
        "for": "0s",
        "condition": {
            "compositeQuery": {
                "builderQueries": {
                    "A": { "queryName": "A", "expression": "A" },
                    "F1": { "queryName": "F1", "expression": "A / 100" }
                }
            },
            "selectedQueryName": "F1",
            "target": 0.8
        }
    }));
    assert_eq!(rule.selected_query(), "F1");

    let raw = series("web-01", &[(-30, 95.0)]).with_query_name("A");
    let formula = series("web-01", &[(-30, 0.5)]).with_query_name("F1");
    assert_eq!(rule.apply(&[raw.clone(), formula], at(0)), 0);

    let formula = series("web-01", &[(30, 0.95)]).with_query_name("F1");
    assert_eq!(rule.apply(&[raw, formula], at(60)), 1);
    assert_eq!(only_alert(&rule).value, 0.95);
}

#[test]
fn formula_is_preferred_without_selection() {
    let rule = rule(serde_json::json!({
        "condition": {
            "compositeQuery": {
                "builderQueries": {
                    "A": { "queryName": "A", "expression": "A" },
                    "F1": { "queryName": "F1", "expression": "A * 2" }
                }
            }
        }
    }));
    assert_eq!(rule.selected_query(), "F1");
}

#[test]
fn absent_data_fires_missing_alert() {
    let mut rule = rule(serde_json::json!({
        "for": "0s",
        "condition": { "alertOnAbsent": true, "absentFor": 5 }
    }));

    assert_eq!(rule.apply(&[], at(0)), 1);
    let alert = only_alert(&rule);
    assert!(alert.missing);
    assert_eq!(alert.state, AlertState::Firing);
    assert_eq!(alert.labels.get(ALERT_NAME_LABEL), Some("High CPU"));
    assert_eq!(alert.labels.get("host"), None);

    // Data returns below target: the missing alert resolves.
    rule.apply(&[series("web-01", &[(50, 10.0)])], at(60));
    assert_eq!(only_alert(&rule).state, AlertState::Resolved);
}

#[test]
fn absence_waits_for_absent_for() {
    let mut rule = rule(serde_json::json!({
        "for": "0s",
        "condition": { "alertOnAbsent": true, "absentFor": 5 }
    }));
    rule.apply(&[series("web-01", &[(-10, 10.0)])], at(0));

    assert_eq!(rule.apply(&[], at(120)), 0);
    assert_eq!(rule.apply(&[], at(300)), 1);
    assert!(only_alert(&rule).missing);
}

#[test]
fn huge_absent_for_never_fires_after_data() {
    for absent_for in [200_000_000_000_000u64, u64::MAX] {
        let mut rule = rule(serde_json::json!({
            "for": "0s",
            "condition": { "alertOnAbsent": true, "absentFor": absent_for }
        }));
        rule.apply(&[series("web-01", &[(-10, 10.0)])], at(0));
        assert_eq!(rule.apply(&[], at(60)), 0);
        assert_eq!(rule.apply(&[], at(86_400 * 365)), 0);
    }
}

#[test]
fn sends_follow_resend_delay() {
    let mut rule = rule(serde_json::json!({ "for": "0s" }));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));

    let sent = rule.alerts_to_send(at(0), RESEND);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "High CPU");
    assert_eq!(sent[0].last_sent_at, Some(at(0)));
    // 4 * max(frequency, resend delay)
    assert_eq!(sent[0].valid_until, Some(at(20 * 60)));

    assert!(rule.alerts_to_send(at(60), RESEND).is_empty());
    assert_eq!(rule.alerts_to_send(at(301), RESEND).len(), 1);

    rule.apply(&[series("web-01", &[(320, 10.0)])], at(360));
    let sent = rule.alerts_to_send(at(360), RESEND);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].state, AlertState::Resolved);
    assert!(rule.alerts_to_send(at(420), RESEND).is_empty());
}

#[test]
fn pending_alerts_are_not_sent() {
    let mut rule = rule(serde_json::json!({}));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));
    assert!(rule.alerts_to_send(at(0), RESEND).is_empty());
}

#[test]
fn passthrough_prom_rule_matches_any_data() {
    let mut rule = rule(serde_json::json!({
        "for": "0s",
        "condition": {
            "compositeQuery": {
                "queryType": "promql",
                "builderQueries": null,
                "promQueries": { "A": { "query": "up == 0" } }
            },
            "op": null,
            "target": null,
            "matchType": null
        }
    }));
    rule.apply(&[series("node-1", &[(-60, 0.0)]), series("node-2", &[])], at(0));
    let alert = only_alert(&rule);
    assert_eq!(alert.labels.get("host"), Some("node-1"));
    assert_eq!(alert.value, 0.0);
}

#[test]
fn anomaly_rule_scores_against_season() {
    let mut rule = rule(serde_json::json!({
        "ruleType": "anomaly_rule",
        "for": "0s",
        "condition": { "target": 3, "seasonality": "hourly", "algorithm": "standard" }
    }));
    assert_eq!(rule.query_range(at(0)).0, at(-65 * 60));

    let mut points: Vec<(i64, f64)> = (0..12)
        .map(|i| (-3600 + i * 60, if i % 2 == 0 { 10.0 } else { 12.0 }))
        .collect();
    points.push((-60, 20.0));

    rule.apply(&[series("web-01", &points)], at(0));
    assert_eq!(only_alert(&rule).value, 9.0);
}

#[test]
fn anomaly_rule_without_history_is_skipped() {
    let mut rule = rule(serde_json::json!({
        "ruleType": "anomaly_rule",
        "for": "0s",
        "condition": { "target": 3 }
    }));
    assert_eq!(rule.apply(&[series("web-01", &[(-60, 1000.0)])], at(0)), 0);
}

#[tokio::test]
async fn eval_queries_window_and_marks_rule_healthy() {
    let mut rule = rule(serde_json::json!({ "for": "0s" }));
    let provider = StaticProvider::new(vec![series("web-01", &[(-30, 95.0)])]);

    let count = rule
        .eval(&provider, at(0), &CancellationToken::new(), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(rule.health(), RuleHealth::Good);
    assert_eq!(rule.evaluation_timestamp(), Some(at(0)));
    assert_eq!(*provider.range.lock().unwrap(), Some((at(-300), at(0))));
}

#[tokio::test]
async fn failed_query_keeps_alert_state() {
    let mut rule = rule(serde_json::json!({ "for": "0s" }));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));

    let err = rule
        .eval(&FailingProvider, at(60), &CancellationToken::new(), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Query(QueryError::Status { status: 503, .. })));
    assert_eq!(rule.health(), RuleHealth::Bad);
    assert!(rule.last_error().unwrap().contains("503"));
    assert_eq!(only_alert(&rule).state, AlertState::Firing);
}

#[tokio::test]
async fn slow_query_times_out() {
    let mut rule = rule(serde_json::json!({}));
    let err = rule
        .eval(
            &HangingProvider,
            at(0),
            &CancellationToken::new(),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Timeout(_)));
    assert_eq!(rule.health(), RuleHealth::Bad);
}

#[tokio::test]
async fn cancelled_eval_changes_nothing() {
    let mut rule = rule(serde_json::json!({ "for": "0s" }));
    rule.apply(&[series("web-01", &[(-30, 95.0)])], at(0));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = rule
        .eval(&HangingProvider, at(60), &cancel, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Cancelled));
    assert_eq!(rule.health(), RuleHealth::Unknown);
    assert_eq!(only_alert(&rule).state, AlertState::Firing);
}

#[tokio::test]
async fn test_eval_fires_immediately_without_touching_state() {
    let rule = rule(serde_json::json!({ "for": "1h" }));
    let provider = StaticProvider::new(vec![series("web-01", &[(-30, 95.0)])]);

    let alerts = rule
        .test_eval(&provider, at(0), &CancellationToken::new(), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].name, format!("High CPU{TEST_ALERT_POSTFIX}"));
    assert_eq!(alerts[0].state, AlertState::Firing);
    assert_eq!(
        alerts[0].labels.get(ALERT_NAME_LABEL),
        Some("High CPU_TEST_ALERT")
    );
    assert_eq!(rule.active_alerts().count(), 0);
}
