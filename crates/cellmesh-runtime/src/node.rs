//! `Node`: the concrete `NodeEngine` wiring together membership, the
//! partition table, a worker pool for local dispatch, and a transport
//! for remote dispatch. This is the thing `cellmesh-cli`'s demo grid
//! constructs one of per member.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cellmesh_types::{Address, MemberUuid};

use cellmesh_invoke::{
    ClusterService, ExecutionService, NodeEngine, OperationExecutor, OperationService,
    PartitionService,
};

use crate::executor::{PoolConfig, WorkerPool};
use crate::membership::MembershipTable;
use crate::partition_table::PartitionTable;
use crate::transport::LoopbackTransport;

pub struct Node {
    address: Address,
    uuid: MemberUuid,
    active: AtomicBool,
    membership: Arc<MembershipTable>,
    partitions: Arc<PartitionTable>,
    pool: Arc<WorkerPool>,
    transport: Arc<LoopbackTransport>,
}

impl Node {
    /// Starts a node's worker pool and returns the live engine handle.
    /// The caller is responsible for registering the returned engine
    /// with `transport` under `address` so other nodes can reach it —
    /// `Node` doesn't self-register since construction happens before
    /// the `Arc` it would hand out exists.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        address: Address,
        uuid: MemberUuid,
        worker_count: usize,
        queue_capacity: usize,
        default_call_timeout_millis: i64,
        membership: Arc<MembershipTable>,
        partitions: Arc<PartitionTable>,
        transport: Arc<LoopbackTransport>,
    ) -> Arc<Self> {
        let pool = WorkerPool::start(
            PoolConfig {
                worker_count,
                queue_capacity,
            },
            default_call_timeout_millis,
        );
        Arc::new(Self {
            address,
            uuid,
            active: AtomicBool::new(true),
            membership,
            partitions,
            pool,
            transport,
        })
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.transport.unregister(self.address);
    }
}

impl NodeEngine for Node {
    fn this_address(&self) -> Address {
        self.address
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn cluster_service(&self) -> &dyn ClusterService {
        self.membership.as_ref()
    }

    fn partition_service(&self) -> &dyn PartitionService {
        self.partitions.as_ref()
    }

    fn local_uuid(&self) -> MemberUuid {
        self.uuid
    }

    fn operation_service(&self) -> &dyn OperationService {
        self.transport.as_ref()
    }

    fn execution_service(&self) -> &dyn ExecutionService {
        self.pool.as_ref()
    }

    fn operation_executor(&self) -> &dyn OperationExecutor {
        self.pool.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmesh_types::PartitionId;

    fn address(port: u16) -> Address {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn a_fresh_node_is_active_and_resolves_itself() {
        let membership = Arc::new(MembershipTable::new());
        membership.join(address(7000), MemberUuid::new(1));
        let partitions = Arc::new(PartitionTable::all_primaries_to(4, address(7000)));
        let transport = Arc::new(LoopbackTransport::new(60_000));

        let node = Node::start(
            address(7000),
            MemberUuid::new(1),
            1,
            8,
            60_000,
            membership,
            partitions,
            transport,
        );

        assert!(node.is_active());
        assert_eq!(node.this_address(), address(7000));
        assert_eq!(
            node.partition_service()
                .replica_address(PartitionId::new(0), cellmesh_types::ReplicaIndex::PRIMARY),
            Some(address(7000))
        );
        node.shutdown();
    }

    #[test]
    fn set_active_flips_is_active() {
        let membership = Arc::new(MembershipTable::new());
        let partitions = Arc::new(PartitionTable::new());
        let transport = Arc::new(LoopbackTransport::new(60_000));
        let node = Node::start(
            address(7010),
            MemberUuid::new(1),
            1,
            8,
            60_000,
            membership,
            partitions,
            transport,
        );
        node.set_active(false);
        assert!(!node.is_active());
        node.shutdown();
    }
}
