//! Collaborator traits this layer routes through.
//!
//! The transport, the hash ring and the topology resolver live outside this
//! crate. Only their interface boundary is defined here.

use crate::error::PartitionResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Explicit partition identifier used by custom strategies.
pub type PartitionId = i32;

/// Identifier of one physical host instance in the topology.
pub type HostInstanceId = i32;

/// Consistent-hash key produced by a hashing strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HashKey {
    /// No key was supplied for this sub-request.
    Unset,
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl HashKey {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl From<i64> for HashKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for HashKey {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for HashKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for HashKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<u8>> for HashKey {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("<unset>"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Bytes(value) => {
                f.write_str("0x")?;
                value.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
        }
    }
}

/// Where a sub-request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// The client's single, non-partitioned endpoint.
    Unpartitioned,
    /// A node chosen by the hash ring.
    Node(String),
    /// A logical partition and the hosts currently serving it. Picking one
    /// host is left to the transport's load balancer.
    Partition {
        partition_id: PartitionId,
        hosts: Vec<String>,
    },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unpartitioned => f.write_str("unpartitioned"),
            Self::Node(node) => write!(f, "node:{node}"),
            Self::Partition { partition_id, .. } => write!(f, "partition:{partition_id}"),
        }
    }
}

/// Sends one sub-request to one destination.
#[async_trait]
pub trait Transport<Req, Rep>: Send + Sync {
    async fn send(&self, request: Req, destination: Destination) -> PartitionResult<Rep>;
}

/// Consistent-hash ring lookup.
pub trait HashRing: Send + Sync {
    /// Resolves the node owning `key`.
    ///
    /// Implementations fail with
    /// [`PartitionError::MissingHashingKey`](crate::PartitionError::MissingHashingKey)
    /// when `key` is [`HashKey::Unset`]. `method` is only used for that
    /// diagnostic.
    fn node_for(&self, method: &str, key: &HashKey) -> PartitionResult<Destination>;
}

/// One physical host in the partition topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInstance {
    pub instance_id: HostInstanceId,
    pub address: String,
}

/// Point-in-time view of which hosts serve the service.
///
/// A snapshot can go stale between resolution and the moment a sub-call
/// reaches its backend. That one-time mismatch is left to the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub hosts: Vec<HostInstance>,
}

impl TopologySnapshot {
    pub fn new(hosts: Vec<HostInstance>) -> Self {
        Self { hosts }
    }
}

/// Resolves the current partition topology, usually over the network.
#[async_trait]
pub trait TopologyResolver: Send + Sync {
    async fn resolve_current_partitions(&self) -> PartitionResult<TopologySnapshot>;
}
