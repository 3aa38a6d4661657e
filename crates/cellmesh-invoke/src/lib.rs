//! # cellmesh-invoke
//!
//! The invocation engine: dispatches an [`cellmesh_types::Operation`] to
//! its partitioned or targeted destination, correlates the eventual
//! response, waits out backup acknowledgements, and retries recoverable
//! failures until the caller's budget is spent. See each module for its
//! slice of the contract.

pub mod error;
pub mod future;
pub mod invocation;
pub mod monitor;
pub mod policy;
pub mod registry;
pub mod services;
pub mod target;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{InvocationError, Result};
pub use future::{InvocationFuture, Outcome, TimedOut, INFINITE};
pub use invocation::{Invocation, JoinError};
pub use monitor::InvocationMonitor;
pub use policy::{ExceptionPolicy, PartitionExceptionPolicy, PolicyDecision, TargetExceptionPolicy};
pub use registry::InvocationRegistry;
pub use services::{
    ClusterService, ExecutionService, Member, NodeEngine, OperationExecutor, OperationService,
    PartitionService, Services, SharedOperation,
};
pub use target::{init_invocation_target, ResolvedTarget, Target};
