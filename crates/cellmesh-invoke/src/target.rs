//! `TargetResolver` (spec.md §4.8 / §2's 10% component).
//!
//! Resolves where an invocation's next attempt should go, and validates
//! the resolved target against the operation's own idea of where it
//! belongs before the invocation is allowed to dispatch.

use cellmesh_types::{Address, Fault, MemberUuid, Operation, PartitionId, ReplicaIndex};

use crate::services::{Member, NodeEngine};

/// Where an invocation is bound. Modelled as a small tagged union
/// rather than an inheritance hierarchy (spec.md §9 design notes):
/// partitioned invocations consult the partition table on every
/// attempt (the primary may have moved since the last try), targeted
/// invocations carry a fixed address.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    Partitioned {
        partition_id: PartitionId,
        replica_index: ReplicaIndex,
    },
    Targeted {
        address: Address,
    },
}

impl Target {
    fn lookup(&self, node_engine: &dyn NodeEngine) -> Option<Address> {
        match *self {
            Target::Partitioned {
                partition_id,
                replica_index,
            } => node_engine
                .partition_service()
                .replica_address(partition_id, replica_index),
            Target::Targeted { address } => Some(address),
        }
    }
}

/// The outcome of a successful resolution: where to send, who's there,
/// and whether that's us.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTarget {
    pub address: Address,
    pub member: Member,
    pub remote: bool,
}

/// `initInvocationTarget` (spec.md §4.8). Every failure here
/// short-circuits the attempt; the caller feeds the returned `Fault`
/// straight into `notify`, which is exactly how the exception policy
/// turns `TargetNotMember` etc. into a retry.
pub fn init_invocation_target(
    target: Target,
    op: &dyn Operation,
    node_engine: &dyn NodeEngine,
) -> Result<ResolvedTarget, Fault> {
    let address = match target.lookup(node_engine) {
        Some(address) => address,
        None => {
            return Err(if node_engine.is_active() {
                Fault::WrongTarget
            } else {
                Fault::EngineNotActive
            });
        }
    };

    let member = match node_engine.cluster_service().member(address) {
        Some(member) => member,
        None if op.is_join_operation() => Member {
            address,
            uuid: MemberUuid::new(0),
        },
        None => return Err(Fault::TargetNotMember),
    };

    if let Target::Partitioned {
        partition_id,
        replica_index,
    } = target
    {
        if op.partition_id() != partition_id {
            return Err(Fault::IllegalState(format!(
                "operation partition {} does not match invocation partition {partition_id}",
                op.partition_id()
            )));
        }
        if op.replica_index() != replica_index {
            return Err(Fault::IllegalState(format!(
                "operation replica index {} does not match invocation replica index {}",
                op.replica_index().as_u8(),
                replica_index.as_u8()
            )));
        }
    }

    let remote = address != node_engine.this_address();
    Ok(ResolvedTarget {
        address,
        member,
        remote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNodeEngine, NoopOperation};

    #[test]
    fn targeted_resolves_directly() {
        let engine = FakeNodeEngine::single_node();
        let op = NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY);
        let resolved =
            init_invocation_target(Target::Targeted { address: engine.this_address() }, &op, engine.as_ref())
                .expect("resolves");
        assert!(!resolved.remote);
    }

    #[test]
    fn missing_partition_assignment_is_wrong_target() {
        let engine = FakeNodeEngine::single_node();
        let op = NoopOperation::new(PartitionId::new(99), ReplicaIndex::PRIMARY);
        let err = init_invocation_target(
            Target::Partitioned {
                partition_id: PartitionId::new(99),
                replica_index: ReplicaIndex::PRIMARY,
            },
            &op,
            engine.as_ref(),
        )
        .unwrap_err();
        assert!(matches!(err, Fault::WrongTarget));
    }

    #[test]
    fn mismatched_partition_id_is_illegal_state() {
        let engine = FakeNodeEngine::single_node();
        let op = NoopOperation::new(PartitionId::new(1), ReplicaIndex::PRIMARY);
        let err = init_invocation_target(
            Target::Partitioned {
                partition_id: PartitionId::new(0),
                replica_index: ReplicaIndex::PRIMARY,
            },
            &op,
            engine.as_ref(),
        )
        .unwrap_err();
        assert!(matches!(err, Fault::IllegalState(_)));
    }
}
