//! # cellmesh-types
//!
//! Shared identifiers, the [`Operation`] contract, and the response
//! envelopes that travel between a node's operation executor and the
//! invocation engine (`cellmesh-invoke`).
//!
//! This crate intentionally knows nothing about *how* an operation is
//! dispatched or retried — it only describes the shape of the data the
//! engine reads and writes. See `cellmesh-invoke` for the engine itself.

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::net::SocketAddr;
use std::sync::Weak;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifies a call across its whole retry chain.
///
/// Zero means "unused" (an [`Operation`] that has never been registered
/// with an invocation). Assigned once, on first registration; never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CallId(u64);

impl CallId {
    pub const UNUSED: CallId = CallId(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn is_unused(self) -> bool {
        self.0 == 0
    }
}

impl Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

impl From<u64> for CallId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<CallId> for u64 {
    fn from(id: CallId) -> Self {
        id.0
    }
}

/// The shard an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(u32);

impl PartitionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition#{}", self.0)
    }
}

/// Which copy of a partition an operation addresses. `0` is the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaIndex(u8);

impl ReplicaIndex {
    pub const PRIMARY: ReplicaIndex = ReplicaIndex(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn is_primary(self) -> bool {
        self.0 == 0
    }
}

/// Cluster-wide unique identifier for a member (survives address changes
/// across restarts, unlike [`Address`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberUuid(u128);

impl MemberUuid {
    pub fn new(id: u128) -> Self {
        Self(id)
    }
}

impl Display for MemberUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member#{:032x}", self.0)
    }
}

/// Network address of a cluster member. An explicit type alias (rather
/// than a newtype) since it carries no invariants beyond what
/// `SocketAddr` already enforces.
pub type Address = SocketAddr;

// ============================================================================
// Operation contract
// ============================================================================

/// Unit of work dispatched to a node.
///
/// The invocation engine treats an `Operation` abstractly: it reads and
/// writes a handful of bookkeeping fields (call id, caller identity,
/// partition/replica coordinates, timing) and otherwise never inspects
/// the operation's payload or decides what it means. Concrete operation
/// types (increment a counter, put to a map, ...) live above this crate.
pub trait Operation: Send {
    /// Call id assigned on first registration; [`CallId::UNUSED`] before
    /// that. A non-zero call id precludes reusing this operation in a
    /// different invocation (spec invariant: one live registration per
    /// operation instance).
    fn call_id(&self) -> CallId;

    fn set_call_id(&mut self, id: CallId);

    /// Address and uuid of the node that owns the invoking future. Set
    /// once, on first local dispatch.
    fn caller(&self) -> Option<(Address, MemberUuid)>;

    fn set_caller(&mut self, address: Address, uuid: MemberUuid);

    fn partition_id(&self) -> PartitionId;

    fn replica_index(&self) -> ReplicaIndex;

    fn service_name(&self) -> &str;

    /// Caller-supplied call timeout in milliseconds. `0` (or negative)
    /// means "let the invocation derive one" (spec.md §4.6).
    fn call_timeout_millis(&self) -> i64;

    fn invocation_time_millis(&self) -> i64;

    fn set_invocation_time_millis(&mut self, millis: i64);

    /// True for operations that establish cluster membership; these are
    /// exempt from the `TargetNotMember` retry check (spec.md §4.8).
    fn is_join_operation(&self) -> bool {
        false
    }

    /// Operations that may park inside the executor on a condition
    /// (spec.md's "wait-aware") implement this to expose their wait
    /// budget, distinct from the call timeout.
    fn wait_support(&self) -> Option<&dyn WaitSupport> {
        None
    }

    fn wait_support_mut(&mut self) -> Option<&mut dyn WaitSupport> {
        None
    }

    /// Installs the sink the executor (or transport) delivers the
    /// eventual response to. A weak reference: the operation must never
    /// keep its owning invocation alive (spec.md §9 design notes).
    fn set_response_sink(&mut self, sink: Weak<dyn ResponseSink>);

    /// The sink installed by the most recent `set_response_sink`, if
    /// any. The executor reads this back after running the operation to
    /// know where to deliver the result.
    fn response_sink(&self) -> Option<Weak<dyn ResponseSink>>;

    /// Runs the operation's own logic and produces the response the
    /// executor hands back to `response_sink`. What an operation
    /// actually does (read a value, apply a mutation, ...) is opaque to
    /// both this crate and the invocation engine; only the executor
    /// that owns the operation's concrete type calls this.
    fn execute(&mut self) -> Response;
}

/// Capability exposed by operations that may park inside the executor
/// waiting on a condition distinct from the call timeout (e.g. a map
/// lock, a queue take).
pub trait WaitSupport {
    fn wait_timeout_millis(&self) -> i64;

    fn set_wait_timeout_millis(&mut self, millis: i64);
}

/// Where an [`Operation`]'s eventual response is delivered.
///
/// Implemented by `cellmesh-invoke::Invocation`. Kept as a trait object
/// here so `cellmesh-types` never depends on `cellmesh-invoke`.
pub trait ResponseSink: Send + Sync {
    fn send_response(&self, response: Response);
}

// ============================================================================
// Response envelopes
// ============================================================================

/// An opaque response payload. The engine never inspects this — it only
/// ever moves it into the completed future or into a cached backup slot.
pub type Payload = Box<dyn Any + Send + Sync>;

/// The wire-level (or local-executor) signal an `Operation`'s response
/// handler receives. Mirrors spec.md §4.2's decision table exactly; the
/// engine's `notify` is the sole consumer.
pub enum Response {
    /// Explicit null result (distinguished from "no response yet").
    Null,
    /// The attempt's call-timeout window elapsed while the operation was
    /// parked in a wait-aware executor queue.
    CallTimeout,
    /// A classified failure.
    Error(Fault),
    /// The common case: a value plus how many backups must still ack
    /// before the future may complete.
    Normal { value: Payload, backup_count: u32 },
    /// Anything not covered above completes the future with it directly.
    Other(Payload),
}

impl Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Null => write!(f, "Response::Null"),
            Response::CallTimeout => write!(f, "Response::CallTimeout"),
            Response::Error(fault) => write!(f, "Response::Error({fault:?})"),
            Response::Normal { backup_count, .. } => {
                write!(f, "Response::Normal {{ backup_count: {backup_count} }}")
            }
            Response::Other(_) => write!(f, "Response::Other(..)"),
        }
    }
}

/// Classified failure kinds (spec.md §7's taxonomy). `ExceptionPolicy`
/// in `cellmesh-invoke` maps these to retry/wait/throw.
#[derive(Debug)]
pub enum Fault {
    /// Recoverable transport failure (timeout, connection reset, send
    /// queue full, response-channel refusal).
    RetryableIo(String),
    /// The resolved target address was null and the engine is active.
    WrongTarget,
    /// The resolved target is not active and the engine itself isn't.
    EngineNotActive,
    /// Target address resolved but that member has left the cluster and
    /// this isn't a join operation.
    TargetNotMember,
    /// An `Operation`'s partition/replica id disagreed with the
    /// invocation's — a programming error, not a transient fault.
    IllegalState(String),
    /// A second `sendResponse` on an invocation that already completed.
    ResponseAlreadySent,
    /// The public `invoke()` entry point was called twice on the same
    /// operation.
    OperationReused,
    /// `invoke()` was called from a thread not permitted to block for
    /// this operation kind.
    ThreadDiscipline,
    /// The operation told the engine to keep waiting (wait-aware ops).
    ContinueWait,
    /// Any failure surfaced by the remote peer that isn't one of the
    /// above — delivered to the future as-is.
    Remote(String),
}

impl Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::RetryableIo(msg) => write!(f, "retryable I/O failure: {msg}"),
            Fault::WrongTarget => write!(f, "wrong target"),
            Fault::EngineNotActive => write!(f, "engine is not active"),
            Fault::TargetNotMember => write!(f, "target is not a cluster member"),
            Fault::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Fault::ResponseAlreadySent => write!(f, "response already sent"),
            Fault::OperationReused => write!(f, "operation already invoked"),
            Fault::ThreadDiscipline => write!(f, "invoking-thread discipline violated"),
            Fault::ContinueWait => write!(f, "continue waiting"),
            Fault::Remote(msg) => write!(f, "remote failure: {msg}"),
        }
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_id_roundtrips() {
        let id = CallId::new(42);
        assert!(!id.is_unused());
        assert_eq!(u64::from(id), 42);
        assert!(CallId::UNUSED.is_unused());
    }

    #[test]
    fn replica_index_primary() {
        assert!(ReplicaIndex::PRIMARY.is_primary());
        assert!(!ReplicaIndex::new(1).is_primary());
    }

    #[test]
    fn partition_id_serializes_as_its_inner_value() {
        let id = PartitionId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        assert_eq!(serde_json::from_str::<PartitionId>(&json).unwrap(), id);
    }
}
