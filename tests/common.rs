//! Test helper utilities for rpc-partitioning integration tests
//!
//! Provides an in-memory key-value cluster that plays the transport, hash
//! ring and topology roles, so the partitioned client can be driven end to
//! end through its public API.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use async_trait::async_trait;
use rpc_partitioning::{
    Destination, FailureFlags, FailureValue, HashKey, HashRing, HashingPartitioningStrategy,
    HostInstance, PartitionError, PartitionResult, SourceTag, TopologyResolver, TopologySnapshot,
    Transport,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// Batched lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGet {
    pub keys: Vec<String>,
}

impl BatchGet {
    pub fn new(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Values found for the requested keys.
pub type BatchReply = BTreeMap<String, String>;

/// Node a key lives on: byte sum modulo node count.
pub fn node_index(key: &str, nodes: usize) -> usize {
    key.bytes().map(usize::from).sum::<usize>() % nodes
}

pub fn node_name(index: usize) -> String {
    format!("kv-{index}")
}

/// Hash ring over `nodes` named `kv-0..kv-{nodes-1}`.
pub struct ByteSumRing {
    pub nodes: usize,
}

impl HashRing for ByteSumRing {
    fn node_for(&self, method: &str, key: &HashKey) -> PartitionResult<Destination> {
        match key {
            HashKey::Str(key) => Ok(Destination::Node(node_name(node_index(key, self.nodes)))),
            _ => Err(PartitionError::missing_hashing_key(method)),
        }
    }
}

/// In-memory cluster. Every destination sees the same data set but only
/// answers for the keys it was asked about.
#[derive(Default)]
pub struct KvCluster {
    data: HashMap<String, String>,
    overloaded: HashSet<String>,
    requests: Mutex<Vec<(Destination, BatchGet)>>,
}

impl KvCluster {
    pub fn with_data(pairs: &[(&str, &str)]) -> Self {
        Self {
            data: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// Makes `destination` answer with a restartable rejection.
    pub fn overload(mut self, destination: &Destination) -> Self {
        self.overloaded.insert(destination.to_string());
        self
    }

    pub fn requests(&self) -> Vec<(Destination, BatchGet)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport<BatchGet, BatchReply> for KvCluster {
    async fn send(&self, request: BatchGet, destination: Destination) -> PartitionResult<BatchReply> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((destination.clone(), request.clone()));
        }

        let label = destination.to_string();
        if self.overloaded.contains(&label) {
            let failure = FailureValue::with_reason(
                format!("{label} is overloaded"),
                FailureFlags::REJECTED | FailureFlags::RESTARTABLE,
            )?
            .with_source(SourceTag::RemoteInfo, label);
            return Err(failure.into());
        }

        Ok(request
            .keys
            .into_iter()
            .filter_map(|key| self.data.get(&key).map(|value| (key, value.clone())))
            .collect())
    }
}

/// Topology with `replicas` hosts per partition; instance ids are
/// `partition * replicas + replica`.
pub struct ReplicatedTopology {
    pub partitions: i32,
    pub replicas: i32,
}

#[async_trait]
impl TopologyResolver for ReplicatedTopology {
    async fn resolve_current_partitions(&self) -> PartitionResult<TopologySnapshot> {
        let hosts = (0..self.partitions * self.replicas)
            .map(|instance_id| HostInstance {
                instance_id,
                address: format!("10.0.0.{instance_id}:7000"),
            })
            .collect();
        Ok(TopologySnapshot::new(hosts))
    }
}

/// Merges every successful reply and ignores failures unless nothing
/// succeeded.
pub fn merge_any(
    replies: Vec<BatchReply>,
    failures: Vec<PartitionError>,
) -> PartitionResult<BatchReply> {
    if replies.is_empty() {
        if let Some(failure) = failures.into_iter().next() {
            return Err(failure);
        }
    }
    Ok(replies.into_iter().flatten().collect())
}

/// Fails the logical call on the first captured failure.
pub fn merge_all(
    replies: Vec<BatchReply>,
    failures: Vec<PartitionError>,
) -> PartitionResult<BatchReply> {
    match failures.into_iter().next() {
        Some(failure) => Err(failure),
        None => Ok(replies.into_iter().flatten().collect()),
    }
}

/// Hashing strategy that keys every lookup by its own key.
pub fn batch_get_strategy(
    merger: fn(Vec<BatchReply>, Vec<PartitionError>) -> PartitionResult<BatchReply>,
) -> HashingPartitioningStrategy<BatchGet, BatchReply> {
    HashingPartitioningStrategy::new()
        .partition_method("BatchGet", |request: BatchGet| {
            request
                .keys
                .into_iter()
                .map(|key| (HashKey::from(key.as_str()), BatchGet { keys: vec![key] }))
                .collect()
        })
        .with_request_merger("BatchGet", |batches: Vec<BatchGet>| BatchGet {
            keys: batches.into_iter().flat_map(|batch| batch.keys).collect(),
        })
        .with_response_merger("BatchGet", merger)
}
