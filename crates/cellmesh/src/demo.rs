//! A toy 3-member, 3-partition grid used by `cellmesh-cli` to exercise
//! the whole control flow end to end: target resolution, local/remote
//! dispatch, retry on a simulated transient fault, and waiting out
//! simulated backup acknowledgements.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cellmesh_types::{
    Address, CallId, Fault, MemberUuid, Operation, PartitionId, ReplicaIndex, Response,
    ResponseSink,
};

use cellmesh_invoke::{
    Invocation, InvocationMonitor, InvocationRegistry, NodeEngine, PartitionExceptionPolicy,
    Target,
};
use cellmesh_runtime::{LoopbackTransport, MembershipTable, MonitorLoop, Node, PartitionTable};

/// "Increment a shared counter" — an operation with just enough of a
/// payload to show backups and retries doing something observable.
/// `fail_times` lets the demo simulate a primary that drops the first
/// few attempts before succeeding.
pub struct CounterOperation {
    call_id: CallId,
    caller: Option<(Address, MemberUuid)>,
    partition_id: PartitionId,
    replica_index: ReplicaIndex,
    invocation_time_millis: i64,
    response_sink: Option<Weak<dyn ResponseSink>>,
    counter: Arc<AtomicI64>,
    backup_count: u32,
    fail_times: u32,
    attempts: u32,
}

impl CounterOperation {
    pub fn new(
        partition_id: PartitionId,
        counter: Arc<AtomicI64>,
        backup_count: u32,
        fail_times: u32,
    ) -> Self {
        Self {
            call_id: CallId::UNUSED,
            caller: None,
            partition_id,
            replica_index: ReplicaIndex::PRIMARY,
            invocation_time_millis: 0,
            response_sink: None,
            counter,
            backup_count,
            fail_times,
            attempts: 0,
        }
    }
}

impl Operation for CounterOperation {
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
        "counter"
    }

    fn call_timeout_millis(&self) -> i64 {
        0
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
        if self.attempts < self.fail_times {
            self.attempts += 1;
            return Response::Error(Fault::RetryableIo(format!(
                "simulated failure {}/{}",
                self.attempts, self.fail_times
            )));
        }
        let value = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Response::Normal {
            value: Box::new(value),
            backup_count: self.backup_count,
        }
    }
}

fn system_clock() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_millis() as i64
}

fn address(port: u16) -> Address {
    format!("127.0.0.1:{port}").parse().expect("valid loopback address")
}

/// Runs `rounds` counter invocations against a 3-node, 3-partition toy
/// grid, printing each round's registry size as it's invoked and the
/// final outcome of every invocation once all have settled.
pub fn run(rounds: usize, backup_count: u32, fail_times: u32) {
    cellmesh_runtime::init_tracing();

    let addresses: Vec<Address> = (0..3).map(|i| address(7000 + i)).collect();
    let membership = Arc::new(MembershipTable::new());
    for (i, addr) in addresses.iter().enumerate() {
        membership.join(*addr, MemberUuid::new(i as u128 + 1));
    }

    let partitions = Arc::new(PartitionTable::new());
    for partition in 0..3u32 {
        let owner = addresses[partition as usize % addresses.len()];
        partitions.assign(PartitionId::new(partition), ReplicaIndex::PRIMARY, owner);
    }

    let transport = Arc::new(LoopbackTransport::new(60_000));
    let nodes: Vec<Arc<Node>> = addresses
        .iter()
        .enumerate()
        .map(|(i, addr)| {
            let node = Node::start(
                *addr,
                MemberUuid::new(i as u128 + 1),
                2,
                64,
                60_000,
                Arc::clone(&membership),
                Arc::clone(&partitions),
                Arc::clone(&transport),
            );
            let engine: Arc<dyn NodeEngine> = Arc::clone(&node) as Arc<dyn NodeEngine>;
            transport.register(*addr, Arc::downgrade(&engine));
            node
        })
        .collect();

    let registry = Arc::new(InvocationRegistry::new());
    let monitor = InvocationMonitor::new(Arc::clone(&registry));
    let mut monitor_loop = MonitorLoop::start(monitor, Duration::from_millis(200));

    let counter = Arc::new(AtomicI64::new(0));
    let calling_node: Arc<dyn NodeEngine> = Arc::clone(&nodes[0]) as Arc<dyn NodeEngine>;

    let mut invocations = Vec::with_capacity(rounds);
    for round in 0..rounds {
        let partition_id = PartitionId::new((round % 3) as u32);
        let operation = CounterOperation::new(partition_id, Arc::clone(&counter), backup_count, fail_times);
        let invocation = Invocation::new(
            "counter",
            Box::new(operation),
            Target::Partitioned {
                partition_id,
                replica_index: ReplicaIndex::PRIMARY,
            },
            5,
            100,
            Box::new(PartitionExceptionPolicy),
            Arc::clone(&calling_node),
            Arc::clone(&registry),
            system_clock,
        );
        invocation.invoke().expect("first invoke on a fresh operation");

        if backup_count > 0 {
            let backup_invocation = Arc::clone(&invocation);
            thread::spawn(move || {
                for _ in 0..backup_count {
                    thread::sleep(Duration::from_millis(15));
                    backup_invocation.notify_one_backup_complete();
                }
            });
        }

        println!("round {round}: dispatched, registry size = {}", registry.len());
        invocations.push(invocation);
    }

    for (i, invocation) in invocations.iter().enumerate() {
        match invocation.join() {
            Ok(outcome) => println!("invocation {i}: {outcome:?}"),
            Err(_) => println!("invocation {i}: deadline exceeded"),
        }
    }

    monitor_loop.stop();
    for node in &nodes {
        node.shutdown();
    }
}
