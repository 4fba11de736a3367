/// Errors raised while building notification channels from configuration.
///
/// Delivery itself reports through `anyhow::Result` on
/// [`NotificationChannel::send`](crate::NotificationChannel::send).
///
/// # Examples
///
/// ```rust
/// use vigil_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing url".to_string());
/// assert!(err.to_string().contains("url"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// Two channels were registered under the same name.
    #[error("Notify: duplicate channel name '{0}'")]
    DuplicateChannel(String),

    /// JSON deserialization of a channel config failed.
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Building the HTTP client failed.
    #[error("Notify: HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Convenience `Result` alias for notification setup.
pub type Result<T> = std::result::Result<T, NotifyError>;
