//! A loopback `OperationService::send` that simulates a remote peer by
//! routing through an in-memory registry to another node's own
//! `OperationExecutor`. Wire framing and a real network stack are
//! explicitly out of scope (see DESIGN.md); this exists purely so
//! integration tests and the demo binary can exercise the `remote =
//! true` dispatch path without one.

use std::collections::HashMap;
use std::sync::{RwLock, Weak};

use cellmesh_types::Address;

use cellmesh_invoke::{NodeEngine, OperationService, SharedOperation};

/// Registry of every node reachable from this process, keyed by the
/// address it was registered under. Each `Node` (see `crate::node`)
/// registers itself here and hands out a clone of the transport to its
/// own `OperationService` slot.
pub struct LoopbackTransport {
    nodes: RwLock<HashMap<Address, Weak<dyn NodeEngine>>>,
    default_call_timeout_millis: i64,
}

impl LoopbackTransport {
    pub fn new(default_call_timeout_millis: i64) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            default_call_timeout_millis,
        }
    }

    pub fn register(&self, address: Address, node: Weak<dyn NodeEngine>) {
        self.nodes.write().unwrap().insert(address, node);
    }

    pub fn unregister(&self, address: Address) {
        self.nodes.write().unwrap().remove(&address);
    }
}

impl OperationService for LoopbackTransport {
    fn send(&self, op: SharedOperation, target: Address) -> bool {
        let node = match self.nodes.read().unwrap().get(&target).and_then(Weak::upgrade) {
            Some(node) => node,
            None => return false,
        };
        node.operation_executor().run_on_calling_thread_if_possible(op);
        true
    }

    fn default_call_timeout_millis(&self) -> i64 {
        self.default_call_timeout_millis
    }

    fn submit_async(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::{MembershipTable, PartitionTable};
    use cellmesh_invoke::testing::NoopOperation;
    use cellmesh_types::{MemberUuid, PartitionId, ReplicaIndex};
    use std::sync::{Arc, Mutex};

    fn address(port: u16) -> Address {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn unregistered_target_fails_the_send() {
        let transport = Arc::new(LoopbackTransport::new(60_000));
        let op: SharedOperation = Arc::new(Mutex::new(Box::new(NoopOperation::new(
            PartitionId::new(0),
            ReplicaIndex::PRIMARY,
        ))));
        assert!(!transport.send(op, address(9999)));
    }

    #[test]
    fn registered_target_dispatches_to_its_own_executor() {
        let transport = Arc::new(LoopbackTransport::new(60_000));
        let membership = Arc::new(MembershipTable::new());
        let partitions = Arc::new(PartitionTable::all_primaries_to(1, address(7001)));
        membership.join(address(7001), MemberUuid::new(1));

        let node = Node::start(
            address(7001),
            MemberUuid::new(1),
            2,
            8,
            60_000,
            membership,
            partitions,
            Arc::clone(&transport),
        );
        let engine: Arc<dyn cellmesh_invoke::NodeEngine> = Arc::clone(&node) as Arc<dyn cellmesh_invoke::NodeEngine>;
        transport.register(address(7001), Arc::downgrade(&engine));

        let op: SharedOperation = Arc::new(Mutex::new(Box::new(NoopOperation::new(
            PartitionId::new(0),
            ReplicaIndex::PRIMARY,
        ))));
        assert!(transport.send(op, address(7001)));
        node.shutdown();
    }
}
