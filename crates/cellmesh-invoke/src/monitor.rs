//! `InvocationMonitor` (spec.md §2's 20% component).
//!
//! Periodic background sweep over every live invocation, driving the
//! two timeout checks that nothing else triggers on its own: the
//! overall call timeout (`notify_invocation_timeout`) and the
//! backup-ack timeout (`check_backup_timeout`). Neither check owns a
//! thread itself — `cellmesh-runtime` schedules `InvocationMonitor::scan`
//! on its own cadence via `ExecutionService`.

use std::sync::Arc;

use crate::registry::InvocationRegistry;

/// Default backup-ack timeout (spec.md §4.5): how long a primary's
/// acknowledged value may sit without every expected backup catching
/// up before the monitor either accepts it anyway (target still alive)
/// or re-drives the whole operation (target gone).
pub const DEFAULT_BACKUP_TIMEOUT_MILLIS: i64 = 5_000;

pub struct InvocationMonitor {
    registry: Arc<InvocationRegistry>,
    backup_timeout_millis: i64,
}

impl InvocationMonitor {
    pub fn new(registry: Arc<InvocationRegistry>) -> Self {
        Self::with_backup_timeout(registry, DEFAULT_BACKUP_TIMEOUT_MILLIS)
    }

    pub fn with_backup_timeout(registry: Arc<InvocationRegistry>, backup_timeout_millis: i64) -> Self {
        Self {
            registry,
            backup_timeout_millis,
        }
    }

    /// One sweep over every currently-registered invocation. Cheap and
    /// side-effect-free for invocations that are neither overdue nor
    /// waiting on backups; safe to call at whatever cadence the runtime
    /// picks (spec.md suggests ~1s, same order as the teacher's own
    /// periodic scans).
    pub fn scan(&self) {
        let invocations = self.registry.snapshot();
        tracing::trace!(count = invocations.len(), "invocation monitor sweep");
        for invocation in invocations {
            invocation.check_backup_timeout(self.backup_timeout_millis);
            invocation.notify_invocation_timeout();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Invocation;
    use crate::testing::NoopOperation;
    use cellmesh_types::{PartitionId, Response};
    use std::sync::atomic::Ordering;

    #[test]
    fn scan_times_out_an_overdue_invocation_with_no_response() {
        let registry = Arc::new(InvocationRegistry::new());
        let (invocation, clock) = Invocation::new_for_test_with_clock(
            NoopOperation::new(PartitionId::new(0), cellmesh_types::ReplicaIndex::PRIMARY),
            3,
            10,
        );
        registry.register(&invocation);
        clock.store(invocation.call_timeout_millis() + 1, Ordering::SeqCst);

        let monitor = InvocationMonitor::new(Arc::clone(&registry));
        monitor.scan();

        assert!(invocation.future().is_done());
    }

    /// A value pending with backups outstanding is left alone by the
    /// overall call timeout even once it has elapsed; only the
    /// backup-ack timeout (here, not yet reached) governs it.
    #[test]
    fn scan_leaves_a_pending_value_alone_until_the_backup_timeout_elapses() {
        let registry = Arc::new(InvocationRegistry::new());
        let (invocation, clock) = Invocation::new_for_test_with_clock(
            NoopOperation::new(PartitionId::new(0), cellmesh_types::ReplicaIndex::PRIMARY),
            3,
            10,
        );
        registry.register(&invocation);
        invocation.notify(Response::Normal {
            value: Box::new(1u32),
            backup_count: 1,
        });
        clock.store(invocation.call_timeout_millis() + 1, Ordering::SeqCst);

        let monitor = InvocationMonitor::new(Arc::clone(&registry));
        monitor.scan();

        assert!(!invocation.future().is_done());
    }

    #[test]
    fn scan_is_a_noop_over_an_empty_registry() {
        let registry = Arc::new(InvocationRegistry::new());
        let monitor = InvocationMonitor::new(registry);
        monitor.scan();
    }
}
