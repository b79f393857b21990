//! Core types shared by strategies and the dispatch glue.
//!
//! ## Organization
//! - `errors` - Error classification traits
//! - `transport` - Collaborator traits (transport, hash ring, topology) and routing types
//! - `call` - The logical call passed through tower middleware

pub mod call;
pub mod errors;
pub mod transport;

// Re-export commonly used types
pub use call::RpcCall;
pub use errors::{ClassifiedError, ErrorCategory, ErrorSeverity};
pub use transport::{
    Destination, HashKey, HashRing, HostInstance, HostInstanceId, PartitionId, TopologyResolver,
    TopologySnapshot, Transport,
};
