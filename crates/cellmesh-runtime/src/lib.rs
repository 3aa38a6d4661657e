//! # cellmesh-runtime
//!
//! Concrete collaborators for `cellmesh-invoke`'s trait-object seams: a
//! static membership table, a static partition table, a thread-pooled
//! `OperationExecutor`, and a loopback `OperationService` that lets
//! multiple in-process `Node`s exercise the remote-dispatch path without
//! a real network stack. None of this replaces the excluded systems
//! (gossip, replication, wire framing) — it's the minimum a `Node` needs
//! to actually run operations end to end.

pub mod bounded_queue;
pub mod config;
pub mod error;
pub mod executor;
pub mod membership;
pub mod monitor_loop;
pub mod node;
pub mod observability;
pub mod partition_table;
pub mod transport;

pub use bounded_queue::{BoundedQueue, PushResult};
pub use config::{InvocationConfig, NodeConfig, RuntimeConfig};
pub use error::{Result, RuntimeError};
pub use executor::{PoolConfig, WorkerPool};
pub use membership::MembershipTable;
pub use monitor_loop::MonitorLoop;
pub use node::Node;
pub use observability::init_tracing;
pub use partition_table::PartitionTable;
pub use transport::LoopbackTransport;
