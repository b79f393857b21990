//! Per-method merger registries.
//!
//! A request merger combines several sub-requests bound for the same
//! destination into one. A response merger combines the outcomes of a
//! fan-out into one logical result.
//!
//! Registries are filled while the strategy is being built and are
//! read-only once the strategy is handed to a
//! [`PartitionedClient`](crate::PartitionedClient). They take no locks.
//!
//! # Example
//!
//! ```rust
//! use rpc_partitioning::merger::ResponseMergerRegistry;
//!
//! let mut registry = ResponseMergerRegistry::<String>::new();
//! registry.add("Get", |successes: Vec<String>, _failures| Ok(successes.join(";")));
//!
//! assert!(registry.get("Get").is_some());
//! assert!(registry.get("Put").is_none());
//! ```

use crate::error::{PartitionError, PartitionResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Combines sub-requests bound for one destination into a single request.
pub type RequestMerger<Req> = Arc<dyn Fn(Vec<Req>) -> Req + Send + Sync>;

/// Combines fan-out outcomes into one logical result.
///
/// Successes and failures arrive in completion order, not request order.
pub type ResponseMerger<Rep> =
    Arc<dyn Fn(Vec<Rep>, Vec<PartitionError>) -> PartitionResult<Rep> + Send + Sync>;

/// Method name to merger lookup table.
pub struct MergerRegistry<M> {
    mergers: HashMap<String, M>,
}

/// Request-side registry.
pub type RequestMergerRegistry<Req> = MergerRegistry<RequestMerger<Req>>;

/// Response-side registry.
pub type ResponseMergerRegistry<Rep> = MergerRegistry<ResponseMerger<Rep>>;

impl<M> MergerRegistry<M> {
    pub fn new() -> Self {
        Self {
            mergers: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mergers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mergers.len()
    }

    /// Registered method names, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.mergers.keys().map(String::as_str)
    }

    fn insert(&mut self, method: impl Into<String>, merger: M) -> &mut Self {
        self.mergers.insert(method.into(), merger);
        self
    }
}

impl<M: Clone> MergerRegistry<M> {
    /// The merger registered for `method`, if any.
    pub fn get(&self, method: &str) -> Option<M> {
        self.mergers.get(method).cloned()
    }
}

impl<Req> MergerRegistry<RequestMerger<Req>> {
    /// Registers (or replaces) the request merger for `method`.
    pub fn add<F>(&mut self, method: impl Into<String>, merger: F) -> &mut Self
    where
        F: Fn(Vec<Req>) -> Req + Send + Sync + 'static,
    {
        self.insert(method, Arc::new(merger))
    }
}

impl<Rep> MergerRegistry<ResponseMerger<Rep>> {
    /// Registers (or replaces) the response merger for `method`.
    pub fn add<F>(&mut self, method: impl Into<String>, merger: F) -> &mut Self
    where
        F: Fn(Vec<Rep>, Vec<PartitionError>) -> PartitionResult<Rep> + Send + Sync + 'static,
    {
        self.insert(method, Arc::new(merger))
    }
}

impl<M> Default for MergerRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for MergerRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods().collect();
        methods.sort_unstable();
        f.debug_struct("MergerRegistry")
            .field("methods", &methods)
            .finish()
    }
}
