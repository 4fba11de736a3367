use crate::query::QueryError;
use vigil_common::duration::Duration;
use vigil_common::query::QueryValidationError;

/// Validation errors raised when a rule is created, updated or loaded.
///
/// These block persistence; they are never downgraded to warnings.
///
/// # Examples
///
/// ```rust
/// use vigil_alert::error::RuleError;
///
/// let err = RuleError::TargetRequired;
/// assert_eq!(err.to_string(), "target is required");
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("composite query is required")]
    CompositeQueryRequired,

    #[error("target is required")]
    TargetRequired,

    #[error("compare op is required")]
    CompareOpRequired,

    #[error("match type is required")]
    MatchTypeRequired,

    /// Lists every supported operator so the caller can show it verbatim.
    #[error("invalid compare op: {op} supported ops are {supported}")]
    InvalidCompareOp { op: String, supported: String },

    #[error("invalid match type: {match_type} supported ops are {supported}")]
    InvalidMatchType { match_type: String, supported: String },

    #[error("invalid composite query: {0}")]
    InvalidQuery(#[from] QueryValidationError),

    #[error("invalid rule definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid anomaly config: {0}")]
    InvalidAnomalyConfig(String),
}

/// Convenience `Result` alias for rule validation.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Reasons an evaluation cycle ended without updating alert state.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("query timed out after {0}")]
    Timeout(Duration),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error(transparent)]
    Rule(#[from] RuleError),
}
