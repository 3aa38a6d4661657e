//! External collaborator interfaces (spec.md §6).
//!
//! The engine never implements any of these itself — `cellmesh-runtime`
//! provides concrete implementations, and tests provide fakes. Keeping
//! them as trait objects here is what lets `Invocation` stay ignorant of
//! threading model, transport, and membership protocol.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cellmesh_types::{Address, MemberUuid, Operation, PartitionId, ReplicaIndex};

/// Shared handle to the boxed operation an `Invocation` owns. An `Arc`
/// (not a plain `Box`) because dispatch hands a reference to the
/// executor while the `Invocation` itself keeps using the same
/// operation across retries (spec.md §3: "the Operation inside may be
/// reset-and-reused in a re-invocation").
pub type SharedOperation = Arc<Mutex<Box<dyn Operation>>>;

/// A cluster member record, as returned by [`ClusterService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub address: Address,
    pub uuid: MemberUuid,
}

/// Membership and clock access (spec.md §6's `NodeEngine` sub-facets are
/// split into this and [`NodeEngine`] itself to keep each trait small).
pub trait ClusterService: Send + Sync {
    /// Resolves the member record backing `address`, or `None` if it has
    /// left the cluster.
    fn member(&self, address: Address) -> Option<Member>;

    /// Logical cluster clock used for backup/pending-response
    /// timestamps. Not wall-clock time across nodes, only monotonic.
    fn now_millis(&self) -> i64;
}

/// Where a partition's primary and backups currently live.
pub trait PartitionService: Send + Sync {
    /// Returns the member address hosting `(partition_id, replica_index)`,
    /// or `None` if unassigned.
    fn replica_address(&self, partition_id: PartitionId, replica_index: ReplicaIndex)
    -> Option<Address>;
}

/// Top-level handle an `Invocation` is constructed with. Bundles
/// everything spec.md §6 lists under `NodeEngine` plus the services it
/// exposes, so only one `Arc` needs threading through the invocation's
/// constructor.
pub trait NodeEngine: Send + Sync {
    fn this_address(&self) -> Address;

    fn is_active(&self) -> bool;

    fn cluster_service(&self) -> &dyn ClusterService;

    fn partition_service(&self) -> &dyn PartitionService;

    fn local_uuid(&self) -> MemberUuid;

    fn operation_service(&self) -> &dyn OperationService;

    fn execution_service(&self) -> &dyn ExecutionService;

    fn operation_executor(&self) -> &dyn OperationExecutor;
}

/// Decides whether the calling thread may run an operation inline, and
/// runs it (or enqueues it) accordingly.
pub trait OperationExecutor: Send + Sync {
    /// `true` if the current thread is allowed to execute `op`
    /// synchronously (e.g. not already inside another operation's
    /// handler, or this is an async invocation which never runs
    /// inline). Mirrors spec.md §6's
    /// `is_invocation_allowed_from_current_thread`.
    fn is_invocation_allowed_from_current_thread(&self, op: &dyn Operation, is_async: bool)
    -> bool;

    /// Runs `op` on the calling thread if allowed, otherwise hands it to
    /// a worker. Either way, `op`'s response sink eventually fires.
    fn run_on_calling_thread_if_possible(&self, op: SharedOperation);
}

/// Transport plus the invocation-scoped services (registry access, the
/// async executor, the per-invocation logger) spec.md §6 attributes to
/// `OperationService`.
pub trait OperationService: Send + Sync {
    /// Attempts to send `op` to `target`. Returns `false` if the
    /// transport refused the send outright (queue full, connection
    /// closed, unknown address) — the caller turns this into a
    /// `RetryableIo` fault. Takes the shared handle (not a borrow) since
    /// a real send hands the operation off to another thread — and, in
    /// `cellmesh-runtime`'s loopback transport, to another node's own
    /// executor — outliving this call.
    fn send(&self, op: SharedOperation, target: Address) -> bool;

    fn default_call_timeout_millis(&self) -> i64;

    /// Submits a retry attempt for immediate execution (the "fast
    /// retry" path, spec.md §4.7).
    fn submit_async(&self, job: Box<dyn FnOnce() + Send>);
}

/// Delayed scheduling for the "slow retry" path and for the periodic
/// monitor loop (spec.md §6's `ExecutionService::schedule`).
pub trait ExecutionService: Send + Sync {
    fn schedule(&self, pool_name: &str, delay: Duration, task: Box<dyn FnOnce() + Send>);
}

/// Convenience bundle so call sites that only need the three execution
/// surfaces don't have to carry a full `Arc<dyn NodeEngine>` through
/// test code. Production code should prefer [`NodeEngine`].
pub struct Services {
    pub node_engine: Arc<dyn NodeEngine>,
}
