use thiserror::Error;

/// Typed error hierarchy for architect.
///
/// Use at module boundaries (provider calls, workspace policy, config
/// validation, cost accounting). Internal/leaf functions can continue using
/// `anyhow::Result` — the `Internal` variant allows seamless conversion via
/// the `?` operator.
#[derive(Debug, Error)]
pub enum ArchitectError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    #[error("PathEscape: path '{0}' resolves outside the workspace root")]
    PathEscape(String),

    #[error("SensitiveBlocked: path '{0}' matches the sensitive pattern set")]
    SensitiveBlocked(String),

    #[error("Tool error: {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("BudgetExceeded: total cost ${total:.6} exceeds budget ${budget:.6}")]
    BudgetExceeded { total: f64, budget: f64 },

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `ArchitectError`.
pub type ArchitectResult<T> = std::result::Result<T, ArchitectError>;

impl ArchitectError {
    /// Whether this error is retryable (rate limits, transient provider errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            ArchitectError::RateLimit { .. } => true,
            ArchitectError::Provider { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
