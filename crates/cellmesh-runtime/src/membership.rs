//! A static membership table: who is in the cluster and whether they're
//! still reachable. Real membership protocols (gossip, a consensus
//! group) sit above this; this crate only needs something that answers
//! `ClusterService`'s two questions.

use std::collections::HashMap;
use std::sync::RwLock;

use cellmesh_types::{Address, MemberUuid};

use cellmesh_invoke::{ClusterService, Member};

pub struct MembershipTable {
    members: RwLock<HashMap<Address, Member>>,
    clock: std::sync::atomic::AtomicI64,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            clock: std::sync::atomic::AtomicI64::new(0),
        }
    }

    pub fn with_members(members: impl IntoIterator<Item = (Address, MemberUuid)>) -> Self {
        let table = Self::new();
        for (address, uuid) in members {
            table.join(address, uuid);
        }
        table
    }

    pub fn join(&self, address: Address, uuid: MemberUuid) {
        self.members
            .write()
            .unwrap()
            .insert(address, Member { address, uuid });
    }

    pub fn leave(&self, address: Address) {
        self.members.write().unwrap().remove(&address);
    }

    pub fn members(&self) -> Vec<Member> {
        self.members.read().unwrap().values().copied().collect()
    }

    pub fn advance_clock(&self, millis: i64) {
        self.clock
            .fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for MembershipTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterService for MembershipTable {
    fn member(&self, address: Address) -> Option<Member> {
        self.members.read().unwrap().get(&address).copied()
    }

    fn now_millis(&self) -> i64 {
        self.clock.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(port: u16) -> Address {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn join_then_member_resolves() {
        let table = MembershipTable::new();
        table.join(address(7000), MemberUuid::new(1));
        assert!(table.member(address(7000)).is_some());
    }

    #[test]
    fn leave_removes_member() {
        let table = MembershipTable::new();
        table.join(address(7000), MemberUuid::new(1));
        table.leave(address(7000));
        assert!(table.member(address(7000)).is_none());
    }

    #[test]
    fn unknown_address_is_not_a_member() {
        let table = MembershipTable::new();
        assert!(table.member(address(9999)).is_none());
    }
}
