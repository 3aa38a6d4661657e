//! Fixed thread pool backing `OperationExecutor`/`OperationService`/
//! `ExecutionService` for a real (non-fake) node.
//!
//! Grounded on the teacher's thread-per-core runtime: a fixed set of
//! worker threads, each owning a `BoundedQueue` inbox, with deterministic
//! routing so a given partition always lands on the same worker and its
//! operations stay ordered relative to one another. Unlike the teacher's
//! router (hashed on `StreamId` for pinned-core affinity), there is no
//! CPU pinning here — operations are CPU-cheap bookkeeping plus whatever
//! the concrete operation's `execute()` does, not a kernel command
//! pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cellmesh_types::Operation;

use cellmesh_invoke::{ExecutionService, OperationExecutor, OperationService, SharedOperation};

use crate::bounded_queue::{BoundedQueue, PushResult};

/// Number of workers and the bound on each worker's inbox.
pub struct PoolConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: thread::available_parallelism().map_or(1, std::num::NonZero::get),
            queue_capacity: 1024,
        }
    }
}

enum Job {
    Run(SharedOperation),
    Task(Box<dyn FnOnce() + Send>),
    Shutdown,
}

/// Routes a partition id to one of `worker_count` workers by modular
/// hashing, the same scheme as the teacher's `CoreRouter`.
struct Router {
    worker_count: usize,
}

impl Router {
    fn route(&self, partition_id: u32) -> usize {
        partition_id as usize % self.worker_count
    }
}

/// A fixed pool of worker threads. Implements all three of
/// `cellmesh-invoke`'s execution-facing traits so one `Arc<WorkerPool>`
/// is the whole "local dispatch" half of a `NodeEngine`.
pub struct WorkerPool {
    router: Router,
    inboxes: Vec<Arc<BoundedQueue<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    default_call_timeout_millis: i64,
}

impl WorkerPool {
    /// Spawns `config.worker_count` worker threads and returns the
    /// running pool.
    ///
    /// # Panics
    /// Panics if `worker_count` or `queue_capacity` is 0.
    pub fn start(config: PoolConfig, default_call_timeout_millis: i64) -> Arc<Self> {
        assert!(config.worker_count > 0, "worker_count must be positive");

        let inboxes: Vec<_> = (0..config.worker_count)
            .map(|_| Arc::new(BoundedQueue::new(config.queue_capacity)))
            .collect();

        let pool = Arc::new(Self {
            router: Router {
                worker_count: config.worker_count,
            },
            inboxes: inboxes.clone(),
            handles: Mutex::new(Vec::new()),
            next_worker: AtomicUsize::new(0),
            default_call_timeout_millis,
        });

        let handles = inboxes
            .into_iter()
            .enumerate()
            .map(|(worker_id, inbox)| {
                thread::Builder::new()
                    .name(format!("cellmesh-worker-{worker_id}"))
                    .spawn(move || Self::worker_loop(&inbox))
                    .expect("failed to spawn cellmesh worker thread")
            })
            .collect();
        *pool.handles.lock().unwrap() = handles;

        pool
    }

    fn worker_loop(inbox: &BoundedQueue<Job>) {
        loop {
            match inbox.try_pop() {
                Some(Job::Run(op)) => Self::run_job(op),
                Some(Job::Task(task)) => task(),
                Some(Job::Shutdown) => break,
                None => thread::yield_now(),
            }
        }
    }

    fn run_job(op: SharedOperation) {
        let (response, sink) = {
            let mut guard = op.lock().unwrap();
            let response = guard.execute();
            let sink = guard.response_sink();
            (response, sink)
        };
        if let Some(sink) = sink.and_then(|weak| weak.upgrade()) {
            sink.send_response(response);
        } else {
            tracing::trace!("operation completed with no live response sink; dropping result");
        }
    }

    fn submit_task(&self, task: Box<dyn FnOnce() + Send>) {
        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.inboxes.len();
        if let PushResult::Backpressure(Job::Task(task)) =
            self.inboxes[worker].try_push(Job::Task(task))
        {
            // Every worker's inbox is this full only under sustained
            // overload; running inline keeps the retry from being lost.
            tracing::warn!(worker, "worker inbox full, running retry task inline");
            task();
        }
    }

    /// Sends every worker a shutdown job and joins their threads. Safe
    /// to call once; the pool is not meant to be restarted afterwards.
    pub fn shutdown(&self) {
        for inbox in &self.inboxes {
            let _ = inbox.try_push(Job::Shutdown);
        }
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }

    pub fn worker_count(&self) -> usize {
        self.inboxes.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl OperationExecutor for WorkerPool {
    fn is_invocation_allowed_from_current_thread(&self, _op: &dyn Operation, is_async: bool) -> bool {
        // A synchronous (blocking) call from inside a worker thread would
        // deadlock that worker against its own inbox; async invocations
        // never run inline regardless, so only the blocking case needs
        // the check.
        is_async || !thread::current().name().is_some_and(|name| name.starts_with("cellmesh-worker-"))
    }

    fn run_on_calling_thread_if_possible(&self, op: SharedOperation) {
        let partition = op.lock().unwrap().partition_id().as_u32();
        let worker = self.router.route(partition);
        if let PushResult::Backpressure(Job::Run(op)) = self.inboxes[worker].try_push(Job::Run(op))
        {
            tracing::warn!(worker, "worker inbox full, running operation inline");
            Self::run_job(op);
        }
    }
}

impl OperationService for WorkerPool {
    fn send(&self, _op: SharedOperation, _target: cellmesh_types::Address) -> bool {
        // A bare `WorkerPool` has no notion of other nodes; `send` for a
        // multi-node deployment is `crate::transport::LoopbackTransport`,
        // which wraps a pool per node. Reaching this means the caller
        // asked to send somewhere this pool doesn't know how to route.
        false
    }

    fn default_call_timeout_millis(&self) -> i64 {
        self.default_call_timeout_millis
    }

    fn submit_async(&self, job: Box<dyn FnOnce() + Send>) {
        self.submit_task(job);
    }
}

impl ExecutionService for WorkerPool {
    fn schedule(&self, pool_name: &str, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        if delay.is_zero() {
            self.submit_task(task);
            return;
        }
        // Scheduling a delayed retry or monitor tick is rare relative to
        // the operation traffic the worker pool is sized for, so a
        // dedicated sleeper thread per delayed task is simpler than a
        // timer wheel and doesn't contend with the worker inboxes.
        let pool_name = pool_name.to_string();
        thread::Builder::new()
            .name(format!("cellmesh-delay-{pool_name}"))
            .spawn(move || {
                thread::sleep(delay);
                task();
            })
            .expect("failed to spawn delayed-task thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmesh_invoke::testing::NoopOperation;
    use cellmesh_types::{Operation, PartitionId, ReplicaIndex};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    fn shared(op: NoopOperation) -> SharedOperation {
        Arc::new(StdMutex::new(Box::new(op)))
    }

    #[test]
    fn runs_operation_and_delivers_through_its_sink() {
        struct RecordingSink {
            fired: Arc<AtomicBool>,
        }
        impl cellmesh_types::ResponseSink for RecordingSink {
            fn send_response(&self, _response: cellmesh_types::Response) {
                self.fired.store(true, Ordering::SeqCst);
            }
        }

        let pool = WorkerPool::start(
            PoolConfig {
                worker_count: 2,
                queue_capacity: 8,
            },
            60_000,
        );

        let fired = Arc::new(AtomicBool::new(false));
        let sink: Arc<dyn cellmesh_types::ResponseSink> = Arc::new(RecordingSink {
            fired: Arc::clone(&fired),
        });
        let mut op = NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY);
        op.set_response_sink(Arc::downgrade(&sink));
        let op = shared(op);

        pool.run_on_calling_thread_if_possible(op);

        for _ in 0..200 {
            if fired.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(fired.load(Ordering::SeqCst));
        pool.shutdown();
    }

    #[test]
    fn same_partition_always_routes_to_the_same_worker() {
        let router = Router { worker_count: 4 };
        assert_eq!(router.route(7), router.route(7));
    }

    #[test]
    #[should_panic(expected = "worker_count must be positive")]
    fn zero_workers_panics() {
        let _pool = WorkerPool::start(
            PoolConfig {
                worker_count: 0,
                queue_capacity: 8,
            },
            60_000,
        );
    }
}
