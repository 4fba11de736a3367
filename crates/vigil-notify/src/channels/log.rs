use crate::error::Result;
use crate::plugin::ChannelPlugin;
use crate::NotificationChannel;
use async_trait::async_trait;
use serde_json::Value;
use vigil_alert::alert::NamedAlert;

/// Writes one structured `tracing` event per alert.
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, alerts: &[NamedAlert]) -> anyhow::Result<()> {
        for alert in alerts {
            tracing::info!(
                channel = %self.name,
                alert = %alert.name,
                state = %alert.state,
                labels = %alert.labels,
                value = alert.value,
                active_at = %alert.active_at,
                missing = alert.missing,
                generator_url = %alert.generator_url,
                "Alert notification"
            );
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "log"
    }
}

pub struct LogPlugin;

impl ChannelPlugin for LogPlugin {
    fn name(&self) -> &str {
        "log"
    }

    fn validate_config(&self, _config: &Value) -> Result<()> {
        Ok(())
    }

    fn create_channel(&self, channel_name: &str, _config: &Value) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(LogChannel::new(channel_name)))
    }
}
