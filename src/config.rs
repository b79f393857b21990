//! Dispatch configuration.
//!
//! Settings that govern how a [`PartitionedClient`](crate::PartitionedClient)
//! runs a fan-out. Partitioning itself is configured in code through a
//! [`PartitioningStrategy`](crate::PartitioningStrategy); this struct only
//! covers runtime limits.

use crate::error::{PartitionError, PartitionResult};
use crate::logging::log_debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime limits for dispatching sub-calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per sub-call deadline. `None` leaves timeouts to the transport.
    pub sub_call_timeout: Option<Duration>,

    /// Upper bound on sub-calls in flight for one logical call (0 = unlimited)
    pub max_concurrent_sub_calls: usize,

    /// Return a lone sub-call's outcome directly instead of running the
    /// response merger
    pub single_partition_passthrough: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sub_call_timeout: None,
            max_concurrent_sub_calls: 0,
            single_partition_passthrough: true,
        }
    }
}

impl DispatchConfig {
    /// Validate dispatch configuration
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::Configuration`] if the sub-call timeout is zero.
    pub fn validate(&self) -> PartitionResult<()> {
        if self.sub_call_timeout == Some(Duration::ZERO) {
            return Err(PartitionError::configuration_error(
                "sub_call_timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Sub-call deadline in whole milliseconds, saturating at `u64::MAX`.
    pub fn sub_call_timeout_ms(&self) -> Option<u64> {
        self.sub_call_timeout
            .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
    }

    /// Load configuration from environment variables.
    ///
    /// - `PARTITION_SUB_CALL_TIMEOUT_MS`
    /// - `PARTITION_MAX_CONCURRENT_SUB_CALLS`
    /// - `PARTITION_SINGLE_PASSTHROUGH`
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> PartitionResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("PARTITION_SUB_CALL_TIMEOUT_MS") {
            let millis: u64 = value.parse().map_err(|_| {
                PartitionError::configuration_error(format!(
                    "PARTITION_SUB_CALL_TIMEOUT_MS is not a number: {value}"
                ))
            })?;
            config.sub_call_timeout = Some(Duration::from_millis(millis));
        }

        if let Ok(value) = std::env::var("PARTITION_MAX_CONCURRENT_SUB_CALLS") {
            config.max_concurrent_sub_calls = value.parse().map_err(|_| {
                PartitionError::configuration_error(format!(
                    "PARTITION_MAX_CONCURRENT_SUB_CALLS is not a number: {value}"
                ))
            })?;
        }

        if let Ok(value) = std::env::var("PARTITION_SINGLE_PASSTHROUGH") {
            config.single_partition_passthrough = value.parse().map_err(|_| {
                PartitionError::configuration_error(format!(
                    "PARTITION_SINGLE_PASSTHROUGH must be true or false: {value}"
                ))
            })?;
        }

        config.validate()?;

        log_debug!(
            sub_call_timeout_ms = config.sub_call_timeout_ms(),
            max_concurrent_sub_calls = config.max_concurrent_sub_calls,
            single_partition_passthrough = config.single_partition_passthrough,
            "Dispatch configuration loaded from environment"
        );

        Ok(config)
    }

    /// Parse configuration from JSON, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> PartitionResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            PartitionError::configuration_error(format!("Invalid dispatch configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}
