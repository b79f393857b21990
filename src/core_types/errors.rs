//! Error classification traits shared across the crate.

/// Base trait for categorized errors
pub trait ClassifiedError: std::error::Error + Send + Sync + 'static {
    /// Error category for routing and handling decisions
    fn category(&self) -> ErrorCategory;

    /// Severity for logging and alerting
    fn severity(&self) -> ErrorSeverity;

    /// Whether an outer layer may re-issue the call
    fn is_retryable(&self) -> bool {
        false
    }

    /// Convert to a caller-facing message (strips technical details)
    fn user_message(&self) -> String {
        "An error occurred while processing your request".to_string()
    }
}

/// High-level categorization of errors for routing and handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The client was assembled incorrectly (missing mapping or merger).
    Configuration,

    /// A backend partition or the transport failed.
    External,

    /// Invariant violations inside this layer.
    Internal,

    /// The call was cancelled or timed out.
    Transient,
}

/// Severity level for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// System is unusable or data integrity is at risk.
    Critical,

    /// Action failed but system is stable.
    Error,

    /// Unexpected but recoverable situation.
    Warning,

    /// Expected failure, log at info/debug level.
    Info,
}
