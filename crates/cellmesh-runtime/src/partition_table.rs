//! Partition-to-replica assignment: for a given partition and replica
//! index, which member currently hosts it. A real cluster recomputes
//! this on membership change; this table is a plain assignment map a
//! caller updates explicitly, mirroring `PartitionRouter` from the
//! teacher's stream-routing module but keyed on `(PartitionId,
//! ReplicaIndex)` instead of a single hash.

use std::collections::HashMap;
use std::sync::RwLock;

use cellmesh_types::{Address, PartitionId, ReplicaIndex};

use cellmesh_invoke::PartitionService;

pub struct PartitionTable {
    assignments: RwLock<HashMap<(PartitionId, ReplicaIndex), Address>>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self {
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// Assigns every partition in `0..partition_count` to `owner` as
    /// the primary (`ReplicaIndex::PRIMARY`), for a single-node or
    /// all-primaries-local toy deployment.
    pub fn all_primaries_to(partition_count: u32, owner: Address) -> Self {
        let table = Self::new();
        for partition in 0..partition_count {
            table.assign(PartitionId::new(partition), ReplicaIndex::PRIMARY, owner);
        }
        table
    }

    pub fn assign(&self, partition_id: PartitionId, replica_index: ReplicaIndex, owner: Address) {
        self.assignments
            .write()
            .unwrap()
            .insert((partition_id, replica_index), owner);
    }

    pub fn unassign(&self, partition_id: PartitionId, replica_index: ReplicaIndex) {
        self.assignments
            .write()
            .unwrap()
            .remove(&(partition_id, replica_index));
    }
}

impl Default for PartitionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionService for PartitionTable {
    fn replica_address(&self, partition_id: PartitionId, replica_index: ReplicaIndex) -> Option<Address> {
        self.assignments
            .read()
            .unwrap()
            .get(&(partition_id, replica_index))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(port: u16) -> Address {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn assigned_partition_resolves() {
        let table = PartitionTable::new();
        table.assign(PartitionId::new(0), ReplicaIndex::PRIMARY, address(7000));
        assert_eq!(
            table.replica_address(PartitionId::new(0), ReplicaIndex::PRIMARY),
            Some(address(7000))
        );
    }

    #[test]
    fn unassigned_partition_is_none() {
        let table = PartitionTable::new();
        assert!(table
            .replica_address(PartitionId::new(5), ReplicaIndex::PRIMARY)
            .is_none());
    }

    #[test]
    fn all_primaries_to_covers_every_partition() {
        let table = PartitionTable::all_primaries_to(4, address(7000));
        for partition in 0..4 {
            assert_eq!(
                table.replica_address(PartitionId::new(partition), ReplicaIndex::PRIMARY),
                Some(address(7000))
            );
        }
    }
}
