//! # rpc-partitioning
//!
//! Client-side request partitioning for RPC clients: split one logical call
//! into sub-calls routed to different backend partitions, then recombine the
//! partial results, or partial failures, into one logical response.
//!
//! ## Key Features
//!
//! - **Strategies**: consistent-hash partitioning or explicit partition ids
//! - **Per-method mergers**: request mergers for co-located sub-requests,
//!   response mergers for fan-out recombination
//! - **Classified failures**: [`FailureValue`] carries retry-safety flags for
//!   outer retry and backpressure layers
//! - **Presentation filter**: a tower layer that strips internal retry hints
//!   before failures leave the client
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use rpc_partitioning::{
//!     HashKey, HashRing, HashingPartitioningStrategy, PartitionedClient, Transport,
//! };
//!
//! # async fn example(
//! #     transport: Arc<dyn Transport<Vec<i64>, String>>,
//! #     ring: Arc<dyn HashRing>,
//! # ) -> anyhow::Result<()> {
//! let strategy = HashingPartitioningStrategy::new()
//!     .partition_method("MultiGet", |ids: Vec<i64>| {
//!         ids.into_iter()
//!             .map(|id| (HashKey::from(id), vec![id]))
//!             .collect::<HashMap<_, _>>()
//!     })
//!     .with_request_merger("MultiGet", |batches: Vec<Vec<i64>>| batches.concat())
//!     .with_response_merger("MultiGet", |parts: Vec<String>, _failures| Ok(parts.join(";")));
//!
//! let client = PartitionedClient::builder(transport)
//!     .strategy(strategy)
//!     .hash_ring(ring)
//!     .build()?;
//!
//! let merged = client.dispatch("MultiGet", vec![1, 2, 3]).await?;
//! # let _ = merged;
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]
// Wrapped failures without a cause are ruled out at construction
#![allow(clippy::unreachable)]

pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

pub mod client;
pub mod config;
pub mod error;
pub mod failure;
pub mod filter;
pub mod merger;
pub mod strategy;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use client::{PartitionedClient, PartitionedClientBuilder};
pub use config::DispatchConfig;
pub use error::{PartitionError, PartitionResult};
pub use failure::{
    FailureCause, FailureConstructionError, FailureFlags, FailureValue, PresentableForm, SourceTag,
};
pub use filter::{PresentableFailure, PresentableFailureLayer};
pub use merger::{
    MergerRegistry, RequestMerger, RequestMergerRegistry, ResponseMerger, ResponseMergerRegistry,
};
pub use strategy::{
    CustomPartitioningStrategy, HashingPartitioningStrategy, PartitioningStrategy, StrategyKind,
};

pub use core_types::{
    ClassifiedError, Destination, ErrorCategory, ErrorSeverity, HashKey, HashRing, HostInstance,
    HostInstanceId, PartitionId, RpcCall, TopologyResolver, TopologySnapshot, Transport,
};
