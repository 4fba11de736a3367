use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vigil_common::query::CompositeQuery;
use vigil_common::types::Series;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query transport error: {0}")]
    Transport(String),

    #[error("query backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed query response: {0}")]
    Decode(String),
}

/// Executes composite queries against the telemetry store.
///
/// Implementations must be cancel-safe: the engine drops the returned
/// future when a rule is removed or the configured timeout elapses.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Returns the labelled series produced by `query` over `[start, end]`.
    ///
    /// Each series should carry the name of the sub-query it came from so
    /// that the rule can pick out the one it alerts on.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or rejects the query.
    async fn query_range(
        &self,
        query: &CompositeQuery,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Series>, QueryError>;
}
