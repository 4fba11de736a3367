//! Notification delivery for alerts raised by rule evaluation.
//!
//! Alerts are routed to one or more named [`NotificationChannel`]
//! implementations according to each alert's receivers. Built-in channels
//! are a structured `log` channel and a JSON `webhook`.

pub mod channels;
pub mod error;
pub mod manager;
pub mod plugin;
pub mod utils;


use anyhow::Result;
use async_trait::async_trait;
use vigil_alert::alert::NamedAlert;

/// A notification delivery channel that hands alerts to an external
/// service or sink.
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`]
/// and registered by name in the [`manager::NotificationManager`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers one batch of alerts through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send(&self, alerts: &[NamedAlert]) -> Result<()>;

    /// Returns the channel type name (e.g., `"log"`, `"webhook"`).
    fn channel_type(&self) -> &str;
}
