use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use vigil_alert::engine::Rule;
use vigil_alert::error::EvalError;
use vigil_alert::query::QueryProvider;
use vigil_common::duration::Duration;
use vigil_notify::manager::NotificationManager;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub query_timeout: Duration,
    pub resend_delay: Duration,
}

struct RuleTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs every enabled rule on its own task.
///
/// Each task owns its [`Rule`], so a rule's alert table has exactly one
/// writer. A task ticks at the rule's frequency and finishes a whole cycle
/// (fetch, evaluate, dispatch) before waiting for the next tick.
pub struct RuleScheduler {
    provider: Arc<dyn QueryProvider>,
    notifier: Arc<NotificationManager>,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
    tasks: HashMap<String, RuleTask>,
}

impl RuleScheduler {
    pub fn new(
        provider: Arc<dyn QueryProvider>,
        notifier: Arc<NotificationManager>,
        settings: SchedulerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            notifier,
            settings,
            shutdown,
            tasks: HashMap::new(),
        }
    }

    /// Starts the rule's task, replacing any task with the same id.
    /// Returns `false` when the rule is disabled and was not scheduled.
    pub fn add(&mut self, rule: Rule) -> bool {
        let id = rule.id().to_string();
        self.remove(&id);

        if rule.definition().disabled {
            tracing::info!(rule_id = %id, rule_name = %rule.name(), "Alert rule disabled, not scheduling");
            return false;
        }

        tracing::info!(
            rule_id = %id,
            rule_name = %rule.name(),
            frequency = %rule.definition().frequency,
            "Alert rule scheduled"
        );
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(run_rule(
            rule,
            self.provider.clone(),
            self.notifier.clone(),
            self.settings,
            cancel.clone(),
        ));
        self.tasks.insert(id, RuleTask { cancel, handle });
        true
    }

    /// Cancels the rule's task. An in-flight fetch is abandoned and the
    /// rule's alerts are dropped with it.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.tasks.remove(id) {
            Some(task) => {
                task.cancel.cancel();
                tracing::info!(rule_id = %id, "Alert rule unscheduled");
                true
            }
            None => false,
        }
    }

    /// Swaps in a new version of a rule. The old task's alert state is not
    /// carried over.
    pub fn replace(&mut self, rule: Rule) -> bool {
        self.add(rule)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Cancels every task and waits for them to stop.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for (id, task) in self.tasks.drain() {
            if let Err(e) = task.handle.await {
                tracing::error!(rule_id = %id, error = %e, "Alert rule task ended abnormally");
            }
        }
        tracing::info!("Rule scheduler stopped");
    }
}

async fn run_rule(
    mut rule: Rule,
    provider: Arc<dyn QueryProvider>,
    notifier: Arc<NotificationManager>,
    settings: SchedulerSettings,
    cancel: CancellationToken,
) {
    let mut tick = interval(rule.definition().frequency.as_std());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let now = Utc::now();
        match rule
            .eval(provider.as_ref(), now, &cancel, settings.query_timeout)
            .await
        {
            Ok(active) => {
                tracing::debug!(
                    rule_id = %rule.id(),
                    active,
                    elapsed_ms = rule.evaluation_duration().as_millis() as u64,
                    "Alert rule evaluated"
                );
            }
            Err(EvalError::Cancelled) => break,
            // Already logged by the rule; keep the previous alert state and
            // try again next tick.
            Err(_) => continue,
        }

        let alerts = rule.alerts_to_send(now, settings.resend_delay);
        if !alerts.is_empty() {
            let delivered = notifier.notify(&alerts).await;
            tracing::info!(
                rule_id = %rule.id(),
                alerts = alerts.len(),
                channels = delivered,
                "Alert notifications dispatched"
            );
        }
    }

    tracing::debug!(rule_id = %rule.id(), "Alert rule task stopped");
}
