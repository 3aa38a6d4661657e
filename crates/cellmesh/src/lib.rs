//! # cellmesh
//!
//! Facade over the invocation engine (`cellmesh-invoke`), its shared
//! types (`cellmesh-types`), and the in-process runtime that backs a
//! real `NodeEngine` (`cellmesh-runtime`). The `demo` module builds a
//! small toy cluster used by `cellmesh-cli` and is not meant as a
//! library API in its own right.

pub mod demo;

pub use cellmesh_invoke::{
    ExceptionPolicy, Invocation, InvocationError, InvocationFuture, InvocationMonitor,
    InvocationRegistry, NodeEngine, Outcome, PartitionExceptionPolicy, Target,
    TargetExceptionPolicy,
};
pub use cellmesh_runtime::{LoopbackTransport, MembershipTable, MonitorLoop, Node, PartitionTable};
pub use cellmesh_types::{
    Address, CallId, Fault, MemberUuid, Operation, PartitionId, ReplicaIndex, Response,
};
