use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_common::duration::Duration;
use vigil_common::types::Labels;

/// Lifecycle state of one alert instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Inactive,
    Pending,
    Firing,
    Resolved,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Inactive => write!(f, "inactive"),
            AlertState::Pending => write!(f, "pending"),
            AlertState::Firing => write!(f, "firing"),
            AlertState::Resolved => write!(f, "resolved"),
        }
    }
}

/// One evaluation outcome for a unique label set within a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub state: AlertState,
    pub labels: Labels,
    pub annotations: Labels,
    /// Labels of the series that produced the alert, before rule labels
    /// were applied.
    pub query_result_labels: Labels,
    /// Backlink to the rule; empty when none could be built.
    pub generator_url: String,
    /// Preferred notification channels, e.g. `"slack"`.
    pub receivers: Vec<String>,
    pub value: f64,
    pub active_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Raised by absence detection rather than by a threshold.
    pub missing: bool,
}

impl Alert {
    pub fn pending(labels: Labels, query_result_labels: Labels, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            state: AlertState::Pending,
            labels,
            annotations: Labels::new(),
            query_result_labels,
            generator_url: String::new(),
            receivers: Vec::new(),
            value,
            active_at: now,
            fired_at: None,
            resolved_at: None,
            last_sent_at: None,
            valid_until: None,
            missing: false,
        }
    }

    /// Decides whether the alert has to be (re-)sent at `now`.
    ///
    /// Pending alerts are never sent. A resolution that has not been
    /// announced yet is always sent. Otherwise the alert is re-announced
    /// once `resend_delay` has passed since the last send. At exactly
    /// `last_sent_at + resend_delay` the alert is not re-sent yet.
    pub fn needs_sending(&self, now: DateTime<Utc>, resend_delay: Duration) -> bool {
        if self.state == AlertState::Pending {
            return false;
        }

        if let Some(resolved_at) = self.resolved_at {
            if self.last_sent_at.map_or(true, |sent| resolved_at > sent) {
                return true;
            }
        }

        match self.last_sent_at {
            None => true,
            Some(sent) => sent + resend_delay.to_chrono() < now,
        }
    }

    /// Records a send at `now`. `last_sent_at` never moves backwards.
    pub fn mark_sent(&mut self, now: DateTime<Utc>, valid_for: Duration) {
        self.last_sent_at = Some(self.last_sent_at.map_or(now, |sent| sent.max(now)));
        self.valid_until = Some(now + valid_for.to_chrono());
    }
}

/// An alert tagged with the name of the rule that raised it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedAlert {
    pub name: String,
    #[serde(flatten)]
    pub alert: Alert,
}

impl std::ops::Deref for NamedAlert {
    type Target = Alert;

    fn deref(&self) -> &Alert {
        &self.alert
    }
}
