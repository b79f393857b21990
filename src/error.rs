//! Error types for partitioned dispatch.
//!
//! [`PartitionError`] is the error returned across the dispatch boundary. It
//! distinguishes:
//! - classified failures ([`FailureValue`]) carrying retry-safety flags
//! - opaque errors from the transport, passed through untouched
//! - partitioning configuration errors (no mapping, no merger for a method)
//! - unmergeable fan-outs, which keep every sub-failure for diagnostics
//!
//! # Error Handling Example
//!
//! ```rust
//! use rpc_partitioning::{ClassifiedError, ErrorCategory, PartitionError};
//!
//! fn should_page(err: &PartitionError) -> bool {
//!     // Configuration gaps are bugs in the client, not backend noise
//!     err.category() == ErrorCategory::Configuration
//! }
//!
//! let err = PartitionError::unspecified_endpoint("GetUser");
//! assert!(should_page(&err));
//! assert!(!err.is_retryable());
//! ```

use crate::core_types::errors::{ClassifiedError, ErrorCategory, ErrorSeverity};
use crate::failure::{BoxError, FailureCause, FailureConstructionError, FailureFlags, FailureValue, ForeignError};
use crate::logging::{log_debug, log_error, log_warn};
use std::sync::Arc;
use thiserror::Error;

/// Convenient result type for partitioned operations.
pub type PartitionResult<T> = std::result::Result<T, PartitionError>;

/// Errors that can occur while splitting, dispatching or merging a call.
///
/// | Variant | Category | Retryable |
/// |---------|----------|-----------|
/// | `Failure` | External | From flags |
/// | `Foreign` | External | No |
/// | `UnspecifiedEndpoint` | Configuration | No |
/// | `MissingHashingKey` | Configuration | No |
/// | `MissingRequestMerger` | Configuration | No |
/// | `UnknownPartition` | External | No |
/// | `Unmergeable` | Configuration | No |
/// | `PartitioningDisabled` | Configuration | No |
/// | `SubCallTimeout` | Transient | No |
/// | `Configuration` | Configuration | No |
/// | `InvalidFailure` | Internal | No |
#[derive(Error, Debug, Clone)]
pub enum PartitionError {
    /// A classified failure.
    #[error("{0}")]
    Failure(FailureValue),

    /// An error produced outside this layer, with the name of its concrete
    /// type at the point it entered.
    #[error("{error}")]
    Foreign {
        error: ForeignError,
        type_name: &'static str,
    },

    /// The custom strategy declares no partition mapping for the method.
    #[error("No partition mapping specified for method {method}")]
    UnspecifiedEndpoint { method: String },

    /// A sub-call needed a concrete hashing key it did not have.
    #[error("Missing hashing key for method {method}")]
    MissingHashingKey { method: String },

    /// Several sub-requests share a destination but cannot be combined.
    #[error("No request merger registered for method {method}")]
    MissingRequestMerger { method: String },

    /// The topology snapshot has no hosts for a partition id.
    #[error("No hosts found for partition {partition_id}")]
    UnknownPartition { partition_id: i32 },

    /// Sub-calls completed but nothing can combine their outcomes.
    #[error("No response merger registered for method {method} ({successes} successes, {} failures)", .failures.len())]
    Unmergeable {
        method: String,
        successes: usize,
        /// Sub-failures, kept for diagnostics only.
        failures: Vec<PartitionError>,
    },

    /// A fan-out was requested from a client that does not partition.
    #[error("Partitioning is disabled for this client")]
    PartitioningDisabled,

    #[error("Sub-call to {destination} timed out after {timeout_ms}ms")]
    SubCallTimeout { destination: String, timeout_ms: u64 },

    #[error("Partitioning configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid failure: {0}")]
    InvalidFailure(#[from] FailureConstructionError),
}

impl PartitionError {
    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    /// Create an unspecified endpoint error (logs at ERROR level).
    pub fn unspecified_endpoint(method: impl Into<String>) -> Self {
        let method = method.into();
        log_error!(
            error_type = "unspecified_endpoint",
            method = %method,
            "No partition mapping for method"
        );
        Self::UnspecifiedEndpoint { method }
    }

    /// Raised by hash ring implementations for an unset key.
    pub fn missing_hashing_key(method: impl Into<String>) -> Self {
        let method = method.into();
        log_error!(
            error_type = "missing_hashing_key",
            method = %method,
            "Sub-call requires a hashing key"
        );
        Self::MissingHashingKey { method }
    }

    pub fn missing_request_merger(method: impl Into<String>) -> Self {
        let method = method.into();
        log_error!(
            error_type = "missing_request_merger",
            method = %method,
            "Co-located sub-requests cannot be merged"
        );
        Self::MissingRequestMerger { method }
    }

    pub fn unknown_partition(partition_id: i32) -> Self {
        log_warn!(
            error_type = "unknown_partition",
            partition_id = partition_id,
            "Partition id missing from topology snapshot"
        );
        Self::UnknownPartition { partition_id }
    }

    pub fn unmergeable(
        method: impl Into<String>,
        successes: usize,
        failures: Vec<PartitionError>,
    ) -> Self {
        let method = method.into();
        log_error!(
            error_type = "unmergeable",
            method = %method,
            successes = successes,
            failures = failures.len(),
            "Fan-out completed without a response merger"
        );
        Self::Unmergeable {
            method,
            successes,
            failures,
        }
    }

    pub fn sub_call_timeout(destination: impl Into<String>, timeout_ms: u64) -> Self {
        let destination = destination.into();
        log_warn!(
            error_type = "sub_call_timeout",
            destination = %destination,
            timeout_ms = timeout_ms,
            "Sub-call timed out"
        );
        Self::SubCallTimeout {
            destination,
            timeout_ms,
        }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Partitioning configuration validation failed"
        );
        Self::Configuration { message }
    }

    /// Wraps an error produced outside this layer.
    ///
    /// The concrete type name is captured here, before the error is erased,
    /// so an adapted failure can still be labelled when the error has no
    /// message.
    pub fn foreign<E>(error: E) -> Self
    where
        E: Into<BoxError> + 'static,
    {
        let type_name = std::any::type_name::<E>();
        let error: ForeignError = Arc::from(error.into());
        log_debug!(
            error_type = "foreign",
            error = %error,
            type_name = type_name,
            "Foreign error"
        );
        Self::Foreign { error, type_name }
    }

    /// Converts an `anyhow` error from a collaborator into a foreign error.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self::foreign(error)
    }

    /// The classified failure, if this is one.
    pub fn as_failure(&self) -> Option<&FailureValue> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Turns this error into a cause for a new [`FailureValue`].
    pub fn into_cause(self) -> FailureCause {
        match self {
            Self::Failure(failure) => FailureCause::from(failure),
            Self::Foreign { error, type_name } => FailureCause::Foreign { error, type_name },
            other => FailureCause::foreign(other),
        }
    }

    /// Adapts this error into a classified failure carrying `flags`.
    pub fn adapt(self, flags: FailureFlags) -> PartitionResult<FailureValue> {
        Ok(FailureValue::adapt(self.into_cause(), flags)?)
    }
}

impl From<FailureValue> for PartitionError {
    fn from(failure: FailureValue) -> Self {
        Self::Failure(failure)
    }
}

impl ClassifiedError for PartitionError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Failure(_) => ErrorCategory::External,
            Self::Foreign { .. } => ErrorCategory::External,
            Self::UnspecifiedEndpoint { .. } => ErrorCategory::Configuration,
            Self::MissingHashingKey { .. } => ErrorCategory::Configuration,
            Self::MissingRequestMerger { .. } => ErrorCategory::Configuration,
            Self::UnknownPartition { .. } => ErrorCategory::External,
            Self::Unmergeable { .. } => ErrorCategory::Configuration,
            Self::PartitioningDisabled => ErrorCategory::Configuration,
            Self::SubCallTimeout { .. } => ErrorCategory::Transient,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::InvalidFailure(_) => ErrorCategory::Internal,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Failure(failure) if failure.is_flagged(FailureFlags::INTERRUPTED) => {
                ErrorSeverity::Info
            }
            Self::Failure(_) => ErrorSeverity::Warning,
            Self::Foreign { .. } => ErrorSeverity::Error,
            Self::UnspecifiedEndpoint { .. } => ErrorSeverity::Error,
            Self::MissingHashingKey { .. } => ErrorSeverity::Error,
            Self::MissingRequestMerger { .. } => ErrorSeverity::Error,
            Self::UnknownPartition { .. } => ErrorSeverity::Warning,
            Self::Unmergeable { .. } => ErrorSeverity::Error,
            Self::PartitioningDisabled => ErrorSeverity::Error,
            Self::SubCallTimeout { .. } => ErrorSeverity::Warning,
            Self::Configuration { .. } => ErrorSeverity::Error,
            Self::InvalidFailure(_) => ErrorSeverity::Critical,
        }
    }

    /// Only classified failures flagged `Restartable` or `Rejected`, and not
    /// `NonRetryable`, are safe to re-issue. This layer never re-issues
    /// anything itself.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Failure(failure) => {
                failure.flags().intersects(FailureFlags::RESTARTABLE | FailureFlags::REJECTED)
                    && !failure.is_flagged(FailureFlags::NON_RETRYABLE)
            }
            _ => false,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Failure(failure) if failure.is_flagged(FailureFlags::INTERRUPTED) => {
                "The request was cancelled".to_string()
            }
            Self::Failure(failure) if failure.is_flagged(FailureFlags::REJECTED) => {
                "Service is busy. Please try again".to_string()
            }
            Self::Failure(_) | Self::Foreign { .. } | Self::UnknownPartition { .. } => {
                "Unable to reach the backend service. Please try again".to_string()
            }
            Self::SubCallTimeout { .. } => "Request timed out. Please try again".to_string(),
            Self::InvalidFailure(_) => "Internal error while handling the request".to_string(),
            Self::UnspecifiedEndpoint { .. }
            | Self::MissingHashingKey { .. }
            | Self::MissingRequestMerger { .. }
            | Self::Unmergeable { .. }
            | Self::PartitioningDisabled
            | Self::Configuration { .. } => {
                "Client partitioning is misconfigured for this request".to_string()
            }
        }
    }
}
