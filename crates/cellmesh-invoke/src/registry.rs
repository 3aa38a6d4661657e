//! `InvocationRegistry` (spec.md §2's 10% component).
//!
//! Process-wide mapping from call id to the live `Invocation` that owns
//! it. This is a routing table for incoming responses, not an owner —
//! the registry holds weak references (spec.md §3's ownership note) so
//! a response that arrives after the future has already completed
//! (and the invocation dropped) is simply a no-op lookup miss rather
//! than a dangling reference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use cellmesh_types::CallId;

use crate::invocation::Invocation;

pub struct InvocationRegistry {
    next_call_id: AtomicU64,
    live: RwLock<HashMap<CallId, Weak<Invocation>>>,
}

impl Default for InvocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationRegistry {
    pub fn new() -> Self {
        Self {
            next_call_id: AtomicU64::new(1),
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Assigns a fresh, never-reused call id and registers `invocation`
    /// under it. Spec invariant §3.6: call ids are zero until
    /// registration and never reused afterwards.
    pub fn register(&self, invocation: &Arc<Invocation>) -> CallId {
        let id = CallId::new(self.next_call_id.fetch_add(1, Ordering::Relaxed));
        self.live.write().unwrap().insert(id, Arc::downgrade(invocation));
        id
    }

    pub fn deregister(&self, call_id: CallId) {
        self.live.write().unwrap().remove(&call_id);
    }

    /// Looks up the live invocation for an incoming response. Returns
    /// `None` both when the call id is unknown and when the invocation
    /// it once named has already completed and dropped.
    pub fn lookup(&self, call_id: CallId) -> Option<Arc<Invocation>> {
        self.live.read().unwrap().get(&call_id)?.upgrade()
    }

    pub fn len(&self) -> usize {
        self.live.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every still-live invocation, for the monitor loop's
    /// periodic timeout/backup scan. Dead weak references (the
    /// invocation completed and was dropped without an explicit
    /// `deregister`, e.g. in a test) are skipped, not removed here —
    /// `deregister` is the only mutator of the map's membership, to
    /// keep this method side-effect free and cheap to call every tick.
    pub fn snapshot(&self) -> Vec<Arc<Invocation>> {
        self.live
            .read()
            .unwrap()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoopOperation;
    use cellmesh_types::{PartitionId, ReplicaIndex};

    #[test]
    fn register_then_lookup_then_deregister() {
        let registry = InvocationRegistry::new();
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            50,
        );
        let id = registry.register(&invocation);
        assert!(!id.is_unused());
        assert!(registry.lookup(id).is_some());
        registry.deregister(id);
        assert!(registry.lookup(id).is_none());
    }

    #[test]
    fn call_ids_are_never_reused() {
        let registry = InvocationRegistry::new();
        let a = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            50,
        );
        let b = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            50,
        );
        let id_a = registry.register(&a);
        let id_b = registry.register(&b);
        assert_ne!(id_a, id_b);
    }
}
