//! Partitioning strategies a client author supplies.
//!
//! A client holds exactly one [`PartitioningStrategy`] for its lifetime:
//!
//! - [`PartitioningStrategy::Disabled`] never splits a call
//! - [`HashingPartitioningStrategy`] splits a request into sub-requests keyed
//!   by consistent-hash key; the hash ring picks the node
//! - [`CustomPartitioningStrategy`] splits a request into sub-requests keyed
//!   by explicit partition id, possibly after an asynchronous topology lookup
//!
//! Splitting is registered per method name. A method without a handler has a
//! defined fallback instead of a guess.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use rpc_partitioning::{HashKey, HashingPartitioningStrategy, PartitioningStrategy};
//!
//! let strategy = HashingPartitioningStrategy::<Vec<i64>, String>::new()
//!     .partition_method("MultiGet", |ids: Vec<i64>| {
//!         ids.into_iter()
//!             .map(|id| (HashKey::from(id), vec![id]))
//!             .collect::<HashMap<_, _>>()
//!     })
//!     .with_request_merger("MultiGet", |batches: Vec<Vec<i64>>| batches.concat())
//!     .with_response_merger("MultiGet", |parts: Vec<String>, _failures| Ok(parts.join(",")));
//!
//! let strategy = PartitioningStrategy::from(strategy);
//! assert!(strategy.is_enabled());
//! ```

use crate::core_types::transport::{HashKey, HostInstanceId, PartitionId};
use crate::error::{PartitionError, PartitionResult};
use crate::logging::log_debug;
use crate::merger::{RequestMerger, RequestMergerRegistry, ResponseMerger, ResponseMergerRegistry};
use futures_util::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Splits one request into sub-requests keyed by hash key.
pub type HashingHandler<Req> = Arc<dyn Fn(Req) -> HashMap<HashKey, Req> + Send + Sync>;

/// Asynchronously splits one request into sub-requests keyed by partition id.
pub type CustomHandler<Req> = Arc<
    dyn Fn(Req) -> BoxFuture<'static, PartitionResult<HashMap<PartitionId, Req>>> + Send + Sync,
>;

/// Maps a physical host instance to the logical partition it serves.
pub type LogicalPartitionFn = Arc<dyn Fn(HostInstanceId) -> PartitionId + Send + Sync>;

/// Which of the three strategy shapes is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Disabled,
    Hashing,
    Custom,
}

// ============================================================================
// Hashing
// ============================================================================

/// Consistent-hash partitioning.
pub struct HashingPartitioningStrategy<Req, Rep> {
    handlers: HashMap<String, HashingHandler<Req>>,
    request_mergers: RequestMergerRegistry<Req>,
    response_mergers: ResponseMergerRegistry<Rep>,
}

impl<Req, Rep> HashingPartitioningStrategy<Req, Rep> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            request_mergers: RequestMergerRegistry::new(),
            response_mergers: ResponseMergerRegistry::new(),
        }
    }

    /// Registers how requests of `method` split into hash-keyed sub-requests.
    pub fn partition_method<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Req) -> HashMap<HashKey, Req> + Send + Sync + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
        self
    }

    pub fn with_request_merger<F>(mut self, method: impl Into<String>, merger: F) -> Self
    where
        F: Fn(Vec<Req>) -> Req + Send + Sync + 'static,
    {
        self.request_mergers.add(method, merger);
        self
    }

    pub fn with_response_merger<F>(mut self, method: impl Into<String>, merger: F) -> Self
    where
        F: Fn(Vec<Rep>, Vec<PartitionError>) -> PartitionResult<Rep> + Send + Sync + 'static,
    {
        self.response_mergers.add(method, merger);
        self
    }

    /// Mutable access for bulk registration before the client starts.
    pub fn request_mergers_mut(&mut self) -> &mut RequestMergerRegistry<Req> {
        &mut self.request_mergers
    }

    pub fn response_mergers_mut(&mut self) -> &mut ResponseMergerRegistry<Rep> {
        &mut self.response_mergers
    }

    pub fn request_mergers(&self) -> &RequestMergerRegistry<Req> {
        &self.request_mergers
    }

    pub fn response_mergers(&self) -> &ResponseMergerRegistry<Rep> {
        &self.response_mergers
    }

    pub fn request_merger(&self, method: &str) -> Option<RequestMerger<Req>> {
        self.request_mergers.get(method)
    }

    pub fn handles(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Splits `request` into sub-requests keyed by hash key.
    ///
    /// Methods without a handler yield the whole request under
    /// [`HashKey::Unset`]; the hash ring rejects that key if the sub-call
    /// needs a concrete one.
    pub fn hashing_key_and_request(&self, method: &str, request: Req) -> HashMap<HashKey, Req> {
        match self.handlers.get(method) {
            Some(handler) => handler(request),
            None => {
                log_debug!(method = method, "No hashing handler, using unset key");
                HashMap::from([(HashKey::Unset, request)])
            }
        }
    }
}

impl<Req, Rep> Default for HashingPartitioningStrategy<Req, Rep> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Rep> fmt::Debug for HashingPartitioningStrategy<Req, Rep> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.handlers.keys().collect();
        methods.sort_unstable();
        f.debug_struct("HashingPartitioningStrategy")
            .field("methods", &methods)
            .field("request_mergers", &self.request_mergers)
            .field("response_mergers", &self.response_mergers)
            .finish()
    }
}

// ============================================================================
// Custom
// ============================================================================

/// Explicit partition-id partitioning.
pub struct CustomPartitioningStrategy<Req, Rep> {
    handlers: HashMap<String, CustomHandler<Req>>,
    logical_partition: LogicalPartitionFn,
    response_mergers: ResponseMergerRegistry<Rep>,
}

impl<Req, Rep> CustomPartitioningStrategy<Req, Rep>
where
    Req: Send + 'static,
{
    /// A strategy where every host is its own logical partition.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            logical_partition: Arc::new(|instance_id: HostInstanceId| instance_id),
            response_mergers: ResponseMergerRegistry::new(),
        }
    }

    /// Registers how requests of `method` split into partition-keyed
    /// sub-requests. The handler may await topology data.
    pub fn partition_method<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PartitionResult<HashMap<PartitionId, Req>>> + Send + 'static,
    {
        let handler: CustomHandler<Req> = Arc::new(move |request: Req| handler(request).boxed());
        self.handlers.insert(method.into(), handler);
        self
    }

    /// Groups several host instances under one logical partition.
    pub fn with_logical_partition<F>(mut self, logical_partition: F) -> Self
    where
        F: Fn(HostInstanceId) -> PartitionId + Send + Sync + 'static,
    {
        self.logical_partition = Arc::new(logical_partition);
        self
    }

    pub fn with_response_merger<F>(mut self, method: impl Into<String>, merger: F) -> Self
    where
        F: Fn(Vec<Rep>, Vec<PartitionError>) -> PartitionResult<Rep> + Send + Sync + 'static,
    {
        self.response_mergers.add(method, merger);
        self
    }

    pub fn response_mergers_mut(&mut self) -> &mut ResponseMergerRegistry<Rep> {
        &mut self.response_mergers
    }

    pub fn response_mergers(&self) -> &ResponseMergerRegistry<Rep> {
        &self.response_mergers
    }

    pub fn handles(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// The logical partition served by `instance_id`.
    pub fn logical_partition(&self, instance_id: HostInstanceId) -> PartitionId {
        (self.logical_partition)(instance_id)
    }

    /// Splits `request` into sub-requests keyed by partition id.
    ///
    /// Methods without a handler get an already-failed future carrying
    /// [`PartitionError::UnspecifiedEndpoint`].
    pub fn partition_id_and_request(
        &self,
        method: &str,
        request: Req,
    ) -> BoxFuture<'static, PartitionResult<HashMap<PartitionId, Req>>> {
        match self.handlers.get(method) {
            Some(handler) => handler(request),
            None => future::ready(Err(PartitionError::unspecified_endpoint(method))).boxed(),
        }
    }
}

impl<Req, Rep> Default for CustomPartitioningStrategy<Req, Rep>
where
    Req: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Rep> fmt::Debug for CustomPartitioningStrategy<Req, Rep> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.handlers.keys().collect();
        methods.sort_unstable();
        f.debug_struct("CustomPartitioningStrategy")
            .field("methods", &methods)
            .field("response_mergers", &self.response_mergers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Strategy family
// ============================================================================

/// The closed family of partitioning strategies.
pub enum PartitioningStrategy<Req, Rep> {
    /// No partitioning; calls go to the unpartitioned endpoint.
    Disabled,
    Hashing(HashingPartitioningStrategy<Req, Rep>),
    Custom(CustomPartitioningStrategy<Req, Rep>),
}

impl<Req, Rep> PartitioningStrategy<Req, Rep> {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Disabled => StrategyKind::Disabled,
            Self::Hashing(_) => StrategyKind::Hashing,
            Self::Custom(_) => StrategyKind::Custom,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn response_merger(&self, method: &str) -> Option<ResponseMerger<Rep>> {
        match self {
            Self::Disabled => None,
            Self::Hashing(strategy) => strategy.response_mergers.get(method),
            Self::Custom(strategy) => strategy.response_mergers.get(method),
        }
    }

    /// Combines fan-out outcomes with the merger registered for `method`.
    ///
    /// Without a merger the outcomes are dropped and
    /// [`PartitionError::Unmergeable`] carries the failures for diagnostics.
    pub fn merge_responses(
        &self,
        method: &str,
        successes: Vec<Rep>,
        failures: Vec<PartitionError>,
    ) -> PartitionResult<Rep> {
        if !self.is_enabled() {
            return Err(PartitionError::PartitioningDisabled);
        }
        match self.response_merger(method) {
            Some(merger) => {
                log_debug!(
                    method = method,
                    successes = successes.len(),
                    failures = failures.len(),
                    "Merging fan-out responses"
                );
                merger(successes, failures)
            }
            None => Err(PartitionError::unmergeable(method, successes.len(), failures)),
        }
    }
}

impl<Req, Rep> fmt::Debug for PartitioningStrategy<Req, Rep> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Hashing(strategy) => f.debug_tuple("Hashing").field(strategy).finish(),
            Self::Custom(strategy) => f.debug_tuple("Custom").field(strategy).finish(),
        }
    }
}

impl<Req, Rep> From<HashingPartitioningStrategy<Req, Rep>> for PartitioningStrategy<Req, Rep> {
    fn from(strategy: HashingPartitioningStrategy<Req, Rep>) -> Self {
        Self::Hashing(strategy)
    }
}

impl<Req, Rep> From<CustomPartitioningStrategy<Req, Rep>> for PartitioningStrategy<Req, Rep> {
    fn from(strategy: CustomPartitioningStrategy<Req, Rep>) -> Self {
        Self::Custom(strategy)
    }
}
