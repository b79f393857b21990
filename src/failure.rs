//! Classified failures for partitioned calls.
//!
//! A [`FailureValue`] is an immutable error value annotated with
//! [`FailureFlags`]. Outer retry and backpressure layers read the flags to
//! decide whether a failed sub-call may be re-issued:
//!
//! - [`FailureFlags::RESTARTABLE`] and [`FailureFlags::REJECTED`] mark a
//!   failure as safe to re-issue
//! - [`FailureFlags::NON_RETRYABLE`] marks a failure that must propagate
//! - [`FailureFlags::INTERRUPTED`] marks a failure caused by cancellation
//! - [`FailureFlags::WRAPPED`] marks a failure that is not directly
//!   presentable; its cause is what a caller should see
//!
//! Every transformation returns a new value.
//!
//! # Example
//!
//! ```rust
//! use rpc_partitioning::failure::{FailureCause, FailureFlags, FailureValue, PresentableForm};
//!
//! let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
//! let failure = FailureValue::wrap(FailureCause::foreign(io), FailureFlags::RESTARTABLE).unwrap();
//!
//! assert!(failure.is_flagged(FailureFlags::WRAPPED | FailureFlags::RESTARTABLE));
//! assert!(matches!(failure.presentable_form(), PresentableForm::Foreign { .. }));
//! ```

use crate::logging::{log_debug, log_error, log_info, log_trace, log_warn};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use tracing::Level;

/// Boxed error accepted at layer boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared handle to an error this layer did not produce.
pub type ForeignError = Arc<dyn std::error::Error + Send + Sync>;

// ============================================================================
// Flags
// ============================================================================

bitflags::bitflags! {
    /// Bit set of failure classifications.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct FailureFlags: u32 {
        /// Re-issuing the action is safe.
        const RESTARTABLE = 1 << 0;
        /// The failure was caused by explicit cancellation.
        const INTERRUPTED = 1 << 1;
        /// Not directly presentable; the cause is.
        const WRAPPED = 1 << 2;
        /// The remote side signalled overload.
        const REJECTED = 1 << 3;
        /// Must propagate; never re-issue.
        const NON_RETRYABLE = 1 << 5;
    }
}

impl FailureFlags {
    /// No flags.
    pub const NONE: Self = Self::empty();

    /// Internal resolution failure (topology, hash ring). Not a named flag,
    /// so `from_bits_truncate` and `all` never produce it.
    pub(crate) const NAMING: Self = Self::from_bits_retain(1 << 4);

    /// Flags that are safe to show across a trust boundary.
    pub const SHOW: Self = Self::INTERRUPTED
        .union(Self::REJECTED)
        .union(Self::NON_RETRYABLE);

    fn names(self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.iter_names().map(|(name, _)| name).collect();
        if self.contains(Self::NAMING) {
            names.push("NAMING");
        }
        names
    }
}

impl Default for FailureFlags {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Debug for FailureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("FailureFlags(NONE)");
        }
        write!(f, "FailureFlags({})", self.names().join(" | "))
    }
}

impl fmt::Display for FailureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join("|"))
    }
}

// ============================================================================
// Sources and causes
// ============================================================================

/// Fixed set of diagnostic attachments a failure can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceTag {
    /// Name of the service that produced the failure.
    Service,
    /// Role of the component (client, server, resolver).
    Role,
    /// Remote peer information.
    RemoteInfo,
}

/// Errors raised when a [`FailureValue`] would violate its invariants.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureConstructionError {
    #[error("a Wrapped failure must carry a cause")]
    WrappedWithoutCause,

    #[error("Restartable and NonRetryable are mutually exclusive")]
    RestartableAndNonRetryable,
}

/// Underlying error wrapped by a [`FailureValue`].
#[derive(Debug, Clone)]
pub enum FailureCause {
    /// Another classified failure.
    Failure(Arc<FailureValue>),
    /// Any other error, with the name of its concrete type.
    Foreign {
        error: ForeignError,
        type_name: &'static str,
    },
}

impl FailureCause {
    /// Wraps a concrete error type, remembering its type name.
    pub fn foreign<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Foreign {
            error: Arc::new(error),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Wraps an already type-erased error.
    pub fn from_boxed(error: BoxError) -> Self {
        Self::Foreign {
            error: Arc::from(error),
            type_name: "dyn std::error::Error",
        }
    }

    /// Wraps a shared foreign error handle.
    pub fn from_shared(error: ForeignError) -> Self {
        Self::Foreign {
            error,
            type_name: "dyn std::error::Error",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Failure(failure) => failure.reason.clone(),
            Self::Foreign { error, type_name } => {
                let message = error.to_string();
                if message.is_empty() {
                    (*type_name).to_string()
                } else {
                    message
                }
            }
        }
    }

    fn as_error(&self) -> &(dyn std::error::Error + 'static) {
        match self {
            Self::Failure(failure) => failure.as_ref(),
            Self::Foreign { error, .. } => error.as_ref(),
        }
    }
}

impl From<FailureValue> for FailureCause {
    fn from(failure: FailureValue) -> Self {
        Self::Failure(Arc::new(failure))
    }
}

// Foreign errors compare by identity; there is no structural equality for
// arbitrary error types.
impl PartialEq for FailureCause {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Failure(a), Self::Failure(b)) => a == b,
            (Self::Foreign { error: a, .. }, Self::Foreign { error: b, .. }) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            _ => false,
        }
    }
}

impl Eq for FailureCause {}

impl Hash for FailureCause {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Failure(failure) => {
                0u8.hash(state);
                failure.hash(state);
            }
            Self::Foreign { error, .. } => {
                1u8.hash(state);
                (Arc::as_ptr(error).cast::<()>() as usize).hash(state);
            }
        }
    }
}

/// What a caller outside the trust boundary gets to see.
#[derive(Debug, Clone)]
pub enum PresentableForm {
    Failure(FailureValue),
    /// The foreign error a wrapped chain bottoms out in.
    Foreign {
        error: ForeignError,
        type_name: &'static str,
    },
}

// ============================================================================
// FailureValue
// ============================================================================

/// An immutable, flag-annotated error value.
///
/// Equality and hashing cover reason, cause, flags and sources. The log
/// level is not part of a failure's identity.
#[derive(Debug, Clone)]
pub struct FailureValue {
    reason: String,
    cause: Option<FailureCause>,
    flags: FailureFlags,
    sources: BTreeMap<SourceTag, String>,
    log_level: Level,
}

impl FailureValue {
    /// Default severity used when logging a failure.
    pub const DEFAULT_LOG_LEVEL: Level = Level::WARN;

    /// Creates a failure from an optional cause.
    ///
    /// The reason is `"unknown"` without a cause, otherwise the cause's
    /// message, or its type name when the message is empty.
    pub fn new(
        cause: Option<FailureCause>,
        flags: FailureFlags,
        log_level: Option<Level>,
    ) -> Result<Self, FailureConstructionError> {
        let reason = cause
            .as_ref()
            .map_or_else(|| "unknown".to_string(), FailureCause::message);
        Self::build(
            reason,
            cause,
            flags,
            BTreeMap::new(),
            log_level.unwrap_or(Self::DEFAULT_LOG_LEVEL),
        )
    }

    /// Creates a cause-less failure with an explicit reason.
    pub fn with_reason(
        reason: impl Into<String>,
        flags: FailureFlags,
    ) -> Result<Self, FailureConstructionError> {
        Self::build(
            reason.into(),
            None,
            flags,
            BTreeMap::new(),
            Self::DEFAULT_LOG_LEVEL,
        )
    }

    /// A remote overload signal; safe to re-issue elsewhere.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            cause: None,
            flags: FailureFlags::REJECTED,
            sources: BTreeMap::new(),
            log_level: Self::DEFAULT_LOG_LEVEL,
        }
    }

    /// A failure caused by cancelling the call.
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            cause: None,
            flags: FailureFlags::INTERRUPTED,
            sources: BTreeMap::new(),
            log_level: Level::DEBUG,
        }
    }

    fn build(
        reason: String,
        cause: Option<FailureCause>,
        flags: FailureFlags,
        sources: BTreeMap<SourceTag, String>,
        log_level: Level,
    ) -> Result<Self, FailureConstructionError> {
        if flags.contains(FailureFlags::WRAPPED) && cause.is_none() {
            return Err(FailureConstructionError::WrappedWithoutCause);
        }
        if flags.contains(FailureFlags::RESTARTABLE | FailureFlags::NON_RETRYABLE) {
            return Err(FailureConstructionError::RestartableAndNonRetryable);
        }
        Ok(Self {
            reason,
            cause,
            flags,
            sources,
            log_level,
        })
    }

    /// Adapts an error at a layer boundary.
    ///
    /// A classified failure is chained and flagged, so the original stays in
    /// the history. Anything else becomes a fresh failure wrapping it.
    pub fn adapt(
        cause: FailureCause,
        flags: FailureFlags,
    ) -> Result<Self, FailureConstructionError> {
        match cause {
            FailureCause::Failure(failure) => failure.as_ref().clone().chained().flagged(flags),
            foreign @ FailureCause::Foreign { .. } => Self::new(Some(foreign), flags, None),
        }
    }

    /// Like [`adapt`](Self::adapt), but the result is always `Wrapped`.
    ///
    /// A classified failure only gains flags; no extra layer is added.
    pub fn wrap(cause: FailureCause, flags: FailureFlags) -> Result<Self, FailureConstructionError> {
        let flags = flags | FailureFlags::WRAPPED;
        match cause {
            FailureCause::Failure(failure) => failure.as_ref().clone().flagged(flags),
            foreign @ FailureCause::Foreign { .. } => Self::new(Some(foreign), flags, None),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        self.cause.as_ref()
    }

    pub fn flags(&self) -> FailureFlags {
        self.flags
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }

    /// True when every bit in `flags` is set.
    pub fn is_flagged(&self, flags: FailureFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn source(&self, tag: SourceTag) -> Option<&str> {
        self.sources.get(&tag).map(String::as_str)
    }

    pub fn sources(&self) -> &BTreeMap<SourceTag, String> {
        &self.sources
    }

    /// Adds flags. Returns `self` untouched when they are already set.
    pub fn flagged(self, add: FailureFlags) -> Result<Self, FailureConstructionError> {
        if self.flags.contains(add) {
            return Ok(self);
        }
        let flags = self.flags | add;
        Self::build(self.reason, self.cause, flags, self.sources, self.log_level)
    }

    /// Removes flags. Returns `self` untouched when none of them are set.
    pub fn unflagged(self, remove: FailureFlags) -> Self {
        if !self.flags.intersects(remove) {
            return self;
        }
        Self {
            flags: self.flags.difference(remove),
            ..self
        }
    }

    /// Keeps only the flags in `keep`.
    pub fn masked(self, keep: FailureFlags) -> Self {
        let flags = self.flags & keep;
        if flags == self.flags {
            return self;
        }
        Self { flags, ..self }
    }

    /// Wraps this failure as the cause of a new, unflagged one.
    pub fn chained(self) -> Self {
        let log_level = self.log_level;
        Self {
            reason: self.reason.clone(),
            cause: Some(FailureCause::from(self)),
            flags: FailureFlags::NONE,
            sources: BTreeMap::new(),
            log_level,
        }
    }

    pub fn with_source(mut self, tag: SourceTag, value: impl Into<String>) -> Self {
        self.sources.insert(tag, value.into());
        self
    }

    pub fn with_log_level(self, log_level: Level) -> Self {
        Self { log_level, ..self }
    }

    /// The form of this failure that may cross a trust boundary.
    ///
    /// An unwrapped failure presents as exactly
    /// `masked(FailureFlags::SHOW)`: only the flags are filtered. The reason
    /// and the sources describe the failure rather than how to retry it, so
    /// they are carried unchanged. Wrapped failures resolve to their
    /// innermost presentable cause.
    pub fn presentable_form(&self) -> PresentableForm {
        if !self.is_flagged(FailureFlags::WRAPPED) {
            return PresentableForm::Failure(self.clone().masked(FailureFlags::SHOW));
        }

        match &self.cause {
            Some(FailureCause::Failure(inner)) => inner.presentable_form(),
            Some(FailureCause::Foreign { error, type_name }) => PresentableForm::Foreign {
                error: Arc::clone(error),
                type_name: *type_name,
            },
            None => {
                log_error!(
                    reason = %self.reason,
                    flags = ?self.flags,
                    "Wrapped failure without a cause"
                );
                unreachable!("Wrapped failure without a cause: construction must prevent this")
            }
        }
    }

    /// Logs this failure at its own level.
    pub fn log(&self) {
        let level = self.log_level;
        if level == Level::ERROR {
            log_error!(reason = %self.reason, flags = ?self.flags, "Classified failure");
        } else if level == Level::WARN {
            log_warn!(reason = %self.reason, flags = ?self.flags, "Classified failure");
        } else if level == Level::INFO {
            log_info!(reason = %self.reason, flags = ?self.flags, "Classified failure");
        } else if level == Level::DEBUG {
            log_debug!(reason = %self.reason, flags = ?self.flags, "Classified failure");
        } else {
            log_trace!(reason = %self.reason, flags = ?self.flags, "Classified failure");
        }
    }
}

impl PartialEq for FailureValue {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason
            && self.cause == other.cause
            && self.flags == other.flags
            && self.sources == other.sources
    }
}

impl Eq for FailureValue {}

impl Hash for FailureValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reason.hash(state);
        self.cause.hash(state);
        self.flags.hash(state);
        self.sources.hash(state);
    }
}

impl fmt::Display for FailureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{} (flags={})", self.reason, self.flags)
        }
    }
}

impl std::error::Error for FailureValue {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(FailureCause::as_error)
    }
}
