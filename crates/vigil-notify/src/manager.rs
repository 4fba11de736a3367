use crate::error::{NotifyError, Result};
use crate::plugin::ChannelRegistry;
use crate::NotificationChannel;
use serde_json::Value;
use std::collections::BTreeMap;
use vigil_alert::alert::NamedAlert;

/// Routes alerts to named channels.
///
/// An alert with no receivers goes to every registered channel; otherwise
/// only to the channels it names. Delivery is best-effort: failures are
/// logged and never reach the caller.
#[derive(Default)]
pub struct NotificationManager {
    channels: BTreeMap<String, Box<dyn NotificationChannel>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every `(name, type, config)` entry through `registry`.
    pub fn from_configs<'a>(
        registry: &ChannelRegistry,
        configs: impl IntoIterator<Item = (&'a str, &'a str, &'a Value)>,
    ) -> Result<Self> {
        let mut manager = Self::new();
        for (name, type_name, config) in configs {
            let channel = registry.create_channel(type_name, name, config)?;
            manager.register(name, channel)?;
        }
        Ok(manager)
    }

    pub fn register(&mut self, name: &str, channel: Box<dyn NotificationChannel>) -> Result<()> {
        if self.channels.contains_key(name) {
            return Err(NotifyError::DuplicateChannel(name.to_string()));
        }
        tracing::info!(channel = name, channel_type = channel.channel_type(), "Notification channel registered");
        self.channels.insert(name.to_string(), channel);
        Ok(())
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Groups `alerts` per target channel, preserving their order.
    fn route<'a>(&self, alerts: &'a [NamedAlert]) -> BTreeMap<&str, Vec<&'a NamedAlert>> {
        let mut batches: BTreeMap<&str, Vec<&NamedAlert>> = BTreeMap::new();
        for alert in alerts {
            if alert.receivers.is_empty() {
                for name in self.channels.keys() {
                    batches.entry(name.as_str()).or_default().push(alert);
                }
                continue;
            }
            for receiver in &alert.receivers {
                match self.channels.get_key_value(receiver.as_str()) {
                    Some((name, _)) => batches.entry(name.as_str()).or_default().push(alert),
                    None => tracing::warn!(
                        receiver = %receiver,
                        alert = %alert.name,
                        "Unknown notification channel, skipping"
                    ),
                }
            }
        }
        batches
    }

    /// Sends `alerts` and returns the number of channels that accepted
    /// their batch.
    pub async fn notify(&self, alerts: &[NamedAlert]) -> usize {
        if alerts.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for (name, batch) in self.route(alerts) {
            let Some(channel) = self.channels.get(name) else {
                continue;
            };
            let batch: Vec<NamedAlert> = batch.into_iter().cloned().collect();
            match channel.send(&batch).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    channel = name,
                    channel_type = channel.channel_type(),
                    count = batch.len(),
                    error = %e,
                    "Failed to send notification"
                ),
            }
        }
        delivered
    }
}
