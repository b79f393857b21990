//! Test helper utilities shared by the unit test modules.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

#![allow(dead_code)]

use crate::core_types::transport::{
    Destination, HashKey, HashRing, HostInstance, TopologyResolver, TopologySnapshot, Transport,
};
use crate::error::{PartitionError, PartitionResult};
use crate::strategy::HashingPartitioningStrategy;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Transport whose replies are scripted per destination.
///
/// Unscripted destinations echo the request ids joined with `,`.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: HashMap<Destination, PartitionResult<String>>,
    delays: HashMap<Destination, Duration>,
    sent: Mutex<Vec<(Destination, Vec<i64>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, destination: Destination, reply: PartitionResult<String>) -> Self {
        self.replies.insert(destination, reply);
        self
    }

    pub fn delay(mut self, destination: Destination, delay: Duration) -> Self {
        self.delays.insert(destination, delay);
        self
    }

    pub fn sent(&self) -> Vec<(Destination, Vec<i64>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport<Vec<i64>, String> for ScriptedTransport {
    async fn send(&self, request: Vec<i64>, destination: Destination) -> PartitionResult<String> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.clone(), request.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&destination) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match self.replies.get(&destination) {
            Some(reply) => reply.clone(),
            None => Ok(request
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")),
        }
    }
}

/// Ring that sends integer key `k` to `node-{k % nodes}`.
pub struct ModuloRing {
    pub nodes: i64,
}

impl HashRing for ModuloRing {
    fn node_for(&self, method: &str, key: &HashKey) -> PartitionResult<Destination> {
        match key {
            HashKey::Int(value) => Ok(node(value.rem_euclid(self.nodes))),
            HashKey::Unset => Err(PartitionError::missing_hashing_key(method)),
            other => Ok(Destination::Node(other.to_string())),
        }
    }
}

pub fn node(index: i64) -> Destination {
    Destination::Node(format!("node-{index}"))
}

/// Resolver returning a fixed snapshot.
pub struct StaticTopology {
    pub snapshot: TopologySnapshot,
}

#[async_trait]
impl TopologyResolver for StaticTopology {
    async fn resolve_current_partitions(&self) -> PartitionResult<TopologySnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Snapshot with hosts `1..=count` at `host-{id}:9090`.
pub fn snapshot_with_hosts(count: i32) -> TopologySnapshot {
    TopologySnapshot::new(
        (1..=count)
            .map(|instance_id| HostInstance {
                instance_id,
                address: format!("host-{instance_id}:9090"),
            })
            .collect(),
    )
}

/// Hashing strategy for `MultiGet` that keys each id by itself and joins
/// responses with `;`.
pub fn multi_get_strategy() -> HashingPartitioningStrategy<Vec<i64>, String> {
    HashingPartitioningStrategy::new()
        .partition_method("MultiGet", |ids: Vec<i64>| {
            ids.into_iter()
                .map(|id| (HashKey::from(id), vec![id]))
                .collect()
        })
        .with_request_merger("MultiGet", |batches: Vec<Vec<i64>>| {
            let mut ids = batches.concat();
            ids.sort_unstable();
            ids
        })
        .with_response_merger("MultiGet", |parts: Vec<String>, _failures| {
            let mut parts = parts;
            parts.sort();
            Ok(parts.join(";"))
        })
}
