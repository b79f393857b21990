//! Partition dispatch glue.
//!
//! [`PartitionedClient`] is the entry point used by generated per-method
//! stubs. For each logical call it:
//!
//! 1. asks the strategy to split the request by hash key or partition id
//! 2. resolves a [`Destination`] for every sub-request
//! 3. sends all sub-requests concurrently through the [`Transport`]
//! 4. feeds successes and failures, in completion order, to the response
//!    merger registered for the method
//!
//! Dropping the future returned by [`PartitionedClient::dispatch`] drops every
//! outstanding sub-call; stragglers are never awaited.

use crate::config::DispatchConfig;
use crate::core_types::call::RpcCall;
use crate::core_types::transport::{
    Destination, HashRing, PartitionId, TopologyResolver, TopologySnapshot, Transport,
};
use crate::error::{PartitionError, PartitionResult};
use crate::failure::{FailureFlags, FailureValue};
use crate::logging::{log_debug, log_warn};
use crate::strategy::{CustomPartitioningStrategy, HashingPartitioningStrategy, PartitioningStrategy};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Semaphore;
use tower::Service;
use uuid::Uuid;

struct ClientInner<Req, Rep> {
    strategy: PartitioningStrategy<Req, Rep>,
    transport: Arc<dyn Transport<Req, Rep>>,
    hash_ring: Option<Arc<dyn HashRing>>,
    topology: Option<Arc<dyn TopologyResolver>>,
    config: DispatchConfig,
}

/// Client that fans logical calls out to partitions and merges the results.
///
/// The strategy and its merger registries are frozen when the client is
/// built; cloning the client shares them without locks.
pub struct PartitionedClient<Req, Rep> {
    inner: Arc<ClientInner<Req, Rep>>,
}

impl<Req, Rep> Clone for PartitionedClient<Req, Rep> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Assembles a [`PartitionedClient`].
pub struct PartitionedClientBuilder<Req, Rep> {
    strategy: PartitioningStrategy<Req, Rep>,
    transport: Arc<dyn Transport<Req, Rep>>,
    hash_ring: Option<Arc<dyn HashRing>>,
    topology: Option<Arc<dyn TopologyResolver>>,
    config: DispatchConfig,
}

impl<Req, Rep> PartitionedClientBuilder<Req, Rep>
where
    Req: Send + 'static,
    Rep: Send + 'static,
{
    pub fn strategy(mut self, strategy: impl Into<PartitioningStrategy<Req, Rep>>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn hash_ring(mut self, hash_ring: Arc<dyn HashRing>) -> Self {
        self.hash_ring = Some(hash_ring);
        self
    }

    pub fn topology(mut self, topology: Arc<dyn TopologyResolver>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the assembly and freezes the strategy.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::Configuration`] if:
    /// - a hashing strategy has no hash ring
    /// - a custom strategy has no topology resolver
    /// - the dispatch configuration is invalid
    pub fn build(self) -> PartitionResult<PartitionedClient<Req, Rep>> {
        self.config.validate()?;

        match &self.strategy {
            PartitioningStrategy::Hashing(_) if self.hash_ring.is_none() => {
                return Err(PartitionError::configuration_error(
                    "Hashing partitioning strategy requires a hash ring",
                ));
            }
            PartitioningStrategy::Custom(_) if self.topology.is_none() => {
                return Err(PartitionError::configuration_error(
                    "Custom partitioning strategy requires a topology resolver",
                ));
            }
            _ => {}
        }

        log_debug!(
            strategy = ?self.strategy.kind(),
            max_concurrent_sub_calls = self.config.max_concurrent_sub_calls,
            "PartitionedClient created"
        );

        Ok(PartitionedClient {
            inner: Arc::new(ClientInner {
                strategy: self.strategy,
                transport: self.transport,
                hash_ring: self.hash_ring,
                topology: self.topology,
                config: self.config,
            }),
        })
    }
}

impl<Req, Rep> PartitionedClient<Req, Rep>
where
    Req: Send + 'static,
    Rep: Send + 'static,
{
    /// Starts assembling a client around `transport`. Partitioning is
    /// disabled until a strategy is supplied.
    pub fn builder(transport: Arc<dyn Transport<Req, Rep>>) -> PartitionedClientBuilder<Req, Rep> {
        PartitionedClientBuilder {
            strategy: PartitioningStrategy::Disabled,
            transport,
            hash_ring: None,
            topology: None,
            config: DispatchConfig::default(),
        }
    }

    pub fn strategy(&self) -> &PartitioningStrategy<Req, Rep> {
        &self.inner.strategy
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Runs one logical call.
    pub async fn dispatch(&self, method: &str, request: Req) -> PartitionResult<Rep> {
        let call_id = Uuid::new_v4();

        let sub_calls = match &self.inner.strategy {
            PartitioningStrategy::Disabled => {
                log_debug!(call_id = %call_id, method = method, "Dispatching unpartitioned call");
                return self.send_sub_call(request, Destination::Unpartitioned, None).await;
            }
            PartitioningStrategy::Hashing(strategy) => {
                self.route_hashing(strategy, method, request)?
            }
            PartitioningStrategy::Custom(strategy) => {
                self.route_custom(strategy, method, request).await?
            }
        };

        self.fan_out(call_id, method, sub_calls).await
    }

    /// Runs one logical call until `cancel` resolves.
    ///
    /// On cancellation every outstanding sub-call is dropped and the result is
    /// a failure flagged [`FailureFlags::INTERRUPTED`].
    pub async fn dispatch_until<C>(&self, method: &str, request: Req, cancel: C) -> PartitionResult<Rep>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                log_debug!(method = method, "Logical call cancelled, dropping sub-calls");
                Err(PartitionError::Failure(FailureValue::interrupted(format!(
                    "call to {method} was cancelled"
                ))))
            }
            result = self.dispatch(method, request) => result,
        }
    }

    fn route_hashing(
        &self,
        strategy: &HashingPartitioningStrategy<Req, Rep>,
        method: &str,
        request: Req,
    ) -> PartitionResult<Vec<(Destination, Req)>> {
        let ring = self.inner.hash_ring.as_ref().ok_or_else(|| {
            PartitionError::configuration_error("Hashing partitioning strategy requires a hash ring")
        })?;

        let mut grouped: HashMap<Destination, Vec<Req>> = HashMap::new();
        for (key, sub_request) in strategy.hashing_key_and_request(method, request) {
            let destination = ring.node_for(method, &key)?;
            grouped.entry(destination).or_default().push(sub_request);
        }

        let mut sub_calls = Vec::with_capacity(grouped.len());
        for (destination, mut requests) in grouped {
            let request = if requests.len() > 1 {
                let merger = strategy
                    .request_merger(method)
                    .ok_or_else(|| PartitionError::missing_request_merger(method))?;
                log_debug!(
                    method = method,
                    destination = %destination,
                    merged = requests.len(),
                    "Merging co-located sub-requests"
                );
                merger(requests)
            } else {
                match requests.pop() {
                    Some(request) => request,
                    None => continue,
                }
            };
            sub_calls.push((destination, request));
        }

        Ok(sub_calls)
    }

    async fn route_custom(
        &self,
        strategy: &CustomPartitioningStrategy<Req, Rep>,
        method: &str,
        request: Req,
    ) -> PartitionResult<Vec<(Destination, Req)>> {
        let split = strategy.partition_id_and_request(method, request).await?;

        let resolver = self.inner.topology.as_ref().ok_or_else(|| {
            PartitionError::configuration_error(
                "Custom partitioning strategy requires a topology resolver",
            )
        })?;

        // The snapshot may be stale by the time sub-calls land; the resolver
        // owns that race.
        let snapshot = match resolver.resolve_current_partitions().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_warn!(method = method, error = %err, "Topology resolution failed");
                return Err(PartitionError::Failure(err.adapt(FailureFlags::NAMING)?));
            }
        };
        let partitions = group_hosts(strategy, &snapshot);

        let ordered: BTreeMap<PartitionId, Req> = split.into_iter().collect();
        let mut sub_calls = Vec::with_capacity(ordered.len());
        for (partition_id, sub_request) in ordered {
            let hosts = partitions
                .get(&partition_id)
                .ok_or_else(|| PartitionError::unknown_partition(partition_id))?;
            sub_calls.push((
                Destination::Partition {
                    partition_id,
                    hosts: hosts.clone(),
                },
                sub_request,
            ));
        }

        Ok(sub_calls)
    }

    async fn fan_out(
        &self,
        call_id: Uuid,
        method: &str,
        mut sub_calls: Vec<(Destination, Req)>,
    ) -> PartitionResult<Rep> {
        log_debug!(
            call_id = %call_id,
            method = method,
            sub_calls = sub_calls.len(),
            "Fanning out logical call"
        );

        if sub_calls.len() == 1 && self.inner.config.single_partition_passthrough {
            if let Some((destination, request)) = sub_calls.pop() {
                return self.send_sub_call(request, destination, None).await;
            }
        }

        let limiter = match self.inner.config.max_concurrent_sub_calls {
            0 => None,
            limit => Some(Arc::new(Semaphore::new(limit))),
        };

        let mut in_flight: FuturesUnordered<_> = sub_calls
            .into_iter()
            .map(|(destination, request)| {
                self.send_sub_call(request, destination, limiter.clone())
            })
            .collect();

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        while let Some(outcome) = in_flight.next().await {
            match outcome {
                Ok(response) => successes.push(response),
                Err(err) => failures.push(err),
            }
        }

        log_debug!(
            call_id = %call_id,
            method = method,
            successes = successes.len(),
            failures = failures.len(),
            "All sub-calls completed"
        );

        self.inner
            .strategy
            .merge_responses(method, successes, failures)
    }

    async fn send_sub_call(
        &self,
        request: Req,
        destination: Destination,
        limiter: Option<Arc<Semaphore>>,
    ) -> PartitionResult<Rep> {
        let _permit = match limiter {
            Some(limiter) => Some(limiter.acquire_owned().await.map_err(PartitionError::foreign)?),
            None => None,
        };

        log_debug!(destination = %destination, "Sending sub-call");

        let label = destination.to_string();
        let send = self.inner.transport.send(request, destination);
        let outcome = match self.inner.config.sub_call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, send).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PartitionError::sub_call_timeout(
                    label.clone(),
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            },
            None => send.await,
        };

        log_debug!(destination = %label, ok = outcome.is_ok(), "Sub-call completed");
        outcome
    }
}

/// Groups snapshot hosts by the logical partition they serve.
fn group_hosts<Req, Rep>(
    strategy: &CustomPartitioningStrategy<Req, Rep>,
    snapshot: &TopologySnapshot,
) -> HashMap<PartitionId, Vec<String>>
where
    Req: Send + 'static,
{
    let mut partitions: HashMap<PartitionId, Vec<String>> = HashMap::new();
    for host in &snapshot.hosts {
        partitions
            .entry(strategy.logical_partition(host.instance_id))
            .or_default()
            .push(host.address.clone());
    }
    partitions
}

impl<Req, Rep> Service<RpcCall<Req>> for PartitionedClient<Req, Rep>
where
    Req: Send + 'static,
    Rep: Send + 'static,
{
    type Response = Rep;
    type Error = PartitionError;
    type Future = BoxFuture<'static, PartitionResult<Rep>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: RpcCall<Req>) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.dispatch(&call.method, call.request).await })
    }
}
