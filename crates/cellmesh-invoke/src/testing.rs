//! Shared test fakes. Built once here (rather than duplicated per test
//! module) so unit tests across this crate and integration tests in
//! `tests/` exercise the same minimal engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use cellmesh_types::{
    Address, CallId, MemberUuid, Operation, PartitionId, ReplicaIndex, Response, ResponseSink,
};

use crate::services::{
    ClusterService, ExecutionService, Member, NodeEngine, OperationExecutor, OperationService,
    PartitionService, SharedOperation,
};

/// An operation with no payload beyond its required bookkeeping. Used
/// wherever a test needs *an* operation but doesn't care what it does.
pub struct NoopOperation {
    call_id: CallId,
    caller: Option<(Address, MemberUuid)>,
    partition_id: PartitionId,
    replica_index: ReplicaIndex,
    call_timeout_millis: i64,
    invocation_time_millis: i64,
    response_sink: Option<Weak<dyn ResponseSink>>,
}

impl NoopOperation {
    pub fn new(partition_id: PartitionId, replica_index: ReplicaIndex) -> Self {
        Self {
            call_id: CallId::UNUSED,
            caller: None,
            partition_id,
            replica_index,
            call_timeout_millis: 0,
            invocation_time_millis: 0,
            response_sink: None,
        }
    }

    pub fn with_call_timeout_millis(mut self, millis: i64) -> Self {
        self.call_timeout_millis = millis;
        self
    }
}

impl Operation for NoopOperation {
    fn call_id(&self) -> CallId {
        self.call_id
    }

    fn set_call_id(&mut self, id: CallId) {
        self.call_id = id;
    }

    fn caller(&self) -> Option<(Address, MemberUuid)> {
        self.caller
    }

    fn set_caller(&mut self, address: Address, uuid: MemberUuid) {
        self.caller = Some((address, uuid));
    }

    fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    fn replica_index(&self) -> ReplicaIndex {
        self.replica_index
    }

    fn service_name(&self) -> &str {
        "noop"
    }

    fn call_timeout_millis(&self) -> i64 {
        self.call_timeout_millis
    }

    fn invocation_time_millis(&self) -> i64 {
        self.invocation_time_millis
    }

    fn set_invocation_time_millis(&mut self, millis: i64) {
        self.invocation_time_millis = millis;
    }

    fn set_response_sink(&mut self, sink: Weak<dyn ResponseSink>) {
        self.response_sink = Some(sink);
    }

    fn response_sink(&self) -> Option<Weak<dyn ResponseSink>> {
        self.response_sink.clone()
    }

    fn execute(&mut self) -> Response {
        Response::Null
    }
}

/// A single-threaded, fully synchronous `OperationService` +
/// `ExecutionService` + `OperationExecutor`: everything runs inline, on
/// whatever thread calls it, so tests are deterministic without needing
/// a real thread pool. `cellmesh-runtime` supplies the real, threaded
/// implementations.
pub struct FakeExecutor {
    responses: Mutex<HashMap<CallId, Response>>,
    sent: Mutex<Vec<(Address, CallId)>>,
    fail_sends: AtomicBool,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        })
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent_call_ids(&self) -> Vec<CallId> {
        self.sent.lock().unwrap().iter().map(|(_, id)| *id).collect()
    }

    /// Delivers `response` as if it had arrived for `call_id`, by
    /// invoking the operation's own response sink directly — tests hold
    /// the operation's call id and reach back through the invocation
    /// registry in practice; this fake skips that indirection.
    pub fn deliver(&self, sink: &Weak<dyn ResponseSink>, response: Response) {
        if let Some(sink) = sink.upgrade() {
            sink.send_response(response);
        }
    }
}

impl OperationExecutor for FakeExecutor {
    fn is_invocation_allowed_from_current_thread(&self, _op: &dyn Operation, _is_async: bool) -> bool {
        true
    }

    fn run_on_calling_thread_if_possible(&self, op: SharedOperation) {
        // A noop operation has nothing to run; this fake only records
        // that dispatch happened, so tests assert on call-site effects
        // (the operation's fields) instead.
        let _ = op;
    }
}

impl OperationService for FakeExecutor {
    fn send(&self, op: SharedOperation, target: Address) -> bool {
        if self.fail_sends.load(Ordering::SeqCst) {
            return false;
        }
        let call_id = op.lock().unwrap().call_id();
        self.sent.lock().unwrap().push((target, call_id));
        true
    }

    fn default_call_timeout_millis(&self) -> i64 {
        60_000
    }

    fn submit_async(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

impl ExecutionService for FakeExecutor {
    fn schedule(&self, _pool_name: &str, _delay: Duration, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// A single-node cluster: every partition/replica resolves to `this`,
/// and the one member is always alive unless a test flips `active` off.
pub struct FakeNodeEngine {
    address: Address,
    uuid: MemberUuid,
    active: AtomicBool,
    clock: AtomicI64,
    members: Mutex<HashMap<Address, Member>>,
    partitions: Mutex<HashMap<(PartitionId, ReplicaIndex), Address>>,
    executor: Arc<FakeExecutor>,
}

impl FakeNodeEngine {
    /// A one-node cluster where every partition's primary is `this`
    /// node (`127.0.0.1:7000`).
    pub fn single_node() -> Arc<Self> {
        let address: Address = "127.0.0.1:7000".parse().unwrap();
        let uuid = MemberUuid::new(1);
        let mut members = HashMap::new();
        members.insert(address, Member { address, uuid });
        let mut partitions = HashMap::new();
        for partition in 0..8 {
            partitions.insert((PartitionId::new(partition), ReplicaIndex::PRIMARY), address);
        }
        Arc::new(Self {
            address,
            uuid,
            active: AtomicBool::new(true),
            clock: AtomicI64::new(0),
            members: Mutex::new(members),
            partitions: Mutex::new(partitions),
            executor: FakeExecutor::new(),
        })
    }

    pub fn executor(&self) -> Arc<FakeExecutor> {
        self.executor.clone()
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn remove_member(&self, address: Address) {
        self.members.lock().unwrap().remove(&address);
    }

    pub fn advance_clock(&self, millis: i64) -> i64 {
        self.clock.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl ClusterService for FakeNodeEngine {
    fn member(&self, address: Address) -> Option<Member> {
        self.members.lock().unwrap().get(&address).copied()
    }

    fn now_millis(&self) -> i64 {
        self.clock.load(Ordering::SeqCst)
    }
}

impl PartitionService for FakeNodeEngine {
    fn replica_address(&self, partition_id: PartitionId, replica_index: ReplicaIndex) -> Option<Address> {
        self.partitions
            .lock()
            .unwrap()
            .get(&(partition_id, replica_index))
            .copied()
    }
}

impl NodeEngine for FakeNodeEngine {
    fn this_address(&self) -> Address {
        self.address
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn cluster_service(&self) -> &dyn ClusterService {
        self
    }

    fn partition_service(&self) -> &dyn PartitionService {
        self
    }

    fn local_uuid(&self) -> MemberUuid {
        self.uuid
    }

    fn operation_service(&self) -> &dyn OperationService {
        self.executor.as_ref()
    }

    fn execution_service(&self) -> &dyn ExecutionService {
        self.executor.as_ref()
    }

    fn operation_executor(&self) -> &dyn OperationExecutor {
        self.executor.as_ref()
    }
}
