//! `Invocation` (spec.md §2's 35% component — the core state machine).
//!
//! One execution attempt chain for an `Operation`: resolves a target,
//! dispatches (locally or remotely), correlates the response, waits for
//! backup acknowledgements, retries on recoverable faults, and enforces
//! both the call timeout and the backup-ack timeout. There is no lock
//! on `Invocation` — every mutable field is a single atomic or a small
//! mutex-guarded slot, and `notify` is safe to call concurrently from
//! any thread (spec.md §5).

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::ThreadId;
use std::time::Duration;

use cellmesh_types::{Address, CallId, Fault, Operation, Payload, Response, ResponseSink};

use crate::error::{InvocationError, Result};
use crate::future::{deadline_from_millis, InvocationFuture, Outcome, INFINITE};
use crate::policy::{ExceptionPolicy, PolicyDecision};
use crate::registry::InvocationRegistry;
use crate::services::{Member, NodeEngine, SharedOperation};
use crate::target::{init_invocation_target, Target};

/// Minimum call timeout derived for a wait-aware operation (spec.md
/// §4.6).
pub const MIN_TIMEOUT_MILLIS: i64 = 10_000;

/// Attempts below this count retry immediately on the async executor;
/// at and above it, retries move to the delayed executor (spec.md
/// §4.7).
pub const MAX_FAST_INVOCATION_COUNT: u64 = 5;

/// Above this many attempts, retry logging throttles.
pub const LOG_MAX_INVOCATION_COUNT: u64 = 99;

/// Throttled retry logging fires once every this-many attempts past
/// `LOG_MAX_INVOCATION_COUNT`.
pub const LOG_INVOCATION_COUNT_MOD: u64 = 10;

/// Derives the per-attempt call timeout (spec.md §4.6).
pub fn derive_call_timeout(
    caller_supplied: i64,
    wait_timeout: Option<i64>,
    default_call_timeout: i64,
) -> i64 {
    if caller_supplied > 0 {
        return caller_supplied;
    }
    if let Some(wait) = wait_timeout {
        if wait > 0 && wait != INFINITE {
            return wait.max(MIN_TIMEOUT_MILLIS).min(default_call_timeout);
        }
    }
    default_call_timeout
}

/// Single-transition slot for the primary value once it has arrived but
/// backups are still outstanding. The publication of `backups_expected`
/// must happen-before the publication of this slot's contents (spec.md
/// §5's ordering guarantee 1); `has_value`'s Release store and Acquire
/// loads are what carry that guarantee.
struct PendingResponse {
    backups_expected: AtomicU64,
    has_value: AtomicBool,
    value: Mutex<Option<Payload>>,
    received_at_millis: AtomicI64,
}

impl PendingResponse {
    fn new() -> Self {
        Self {
            backups_expected: AtomicU64::new(0),
            has_value: AtomicBool::new(false),
            value: Mutex::new(None),
            received_at_millis: AtomicI64::new(-1),
        }
    }

    fn reset(&self) {
        self.backups_expected.store(0, Ordering::SeqCst);
        self.has_value.store(false, Ordering::SeqCst);
        *self.value.lock().unwrap() = None;
        self.received_at_millis.store(-1, Ordering::SeqCst);
    }
}

/// The core object. See module docs and spec.md §3-§4 for the full
/// contract.
pub struct Invocation {
    self_weak: Weak<Invocation>,

    service_name: String,
    operation: SharedOperation,
    target: Target,
    try_count: u64,
    try_pause_millis: u64,
    call_timeout: i64,
    policy: Box<dyn ExceptionPolicy>,
    node_engine: Arc<dyn NodeEngine>,
    registry: Arc<InvocationRegistry>,
    future: InvocationFuture,

    invoked: AtomicBool,
    invoke_count: AtomicU64,
    response_received: AtomicBool,
    backups_completed: AtomicU64,
    backup_overrun_total: AtomicU64,
    pending: PendingResponse,

    target_address: Mutex<Option<Address>>,
    target_member: Mutex<Option<Member>>,
    remote: AtomicBool,

    /// The thread that called `invoke()`, recorded so the first-ever
    /// dispatch can be asserted to run on it (spec.md §9's resolved open
    /// question on `invoke()` vs. retry-path thread discipline: only the
    /// very first attempt is ever synchronous with the caller — even a
    /// durability-driven `reset_and_reinvoke` re-drive goes through the
    /// executor like any other retry, so this check fires at most once
    /// per invocation, guarded by `first_attempt_checked`).
    invoking_thread: Mutex<Option<ThreadId>>,
    first_attempt_checked: AtomicBool,

    clock: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl Invocation {
    /// Constructs an invocation. `operation.call_timeout_millis() <= 0`
    /// means "derive one" (spec.md §4.6), using the operation's own
    /// wait-timeout (if any) and the service's configured default.
    pub fn new(
        service_name: impl Into<String>,
        operation: Box<dyn Operation>,
        target: Target,
        try_count: u64,
        try_pause_millis: u64,
        policy: Box<dyn ExceptionPolicy>,
        node_engine: Arc<dyn NodeEngine>,
        registry: Arc<InvocationRegistry>,
        clock: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Arc<Self> {
        let wait_timeout = operation.wait_support().map(|w| w.wait_timeout_millis());
        let caller_supplied = operation.call_timeout_millis();
        let default_call_timeout = node_engine.operation_service().default_call_timeout_millis();
        let call_timeout = derive_call_timeout(caller_supplied, wait_timeout, default_call_timeout);

        Arc::new_cyclic(|weak| Self {
            self_weak: weak.clone(),
            service_name: service_name.into(),
            operation: Arc::new(Mutex::new(operation)),
            target,
            try_count: try_count.max(1),
            try_pause_millis,
            call_timeout,
            policy,
            node_engine,
            registry,
            future: InvocationFuture::new(call_timeout),
            invoked: AtomicBool::new(false),
            invoke_count: AtomicU64::new(0),
            response_received: AtomicBool::new(false),
            backups_completed: AtomicU64::new(0),
            backup_overrun_total: AtomicU64::new(0),
            pending: PendingResponse::new(),
            target_address: Mutex::new(None),
            target_member: Mutex::new(None),
            remote: AtomicBool::new(false),
            invoking_thread: Mutex::new(None),
            first_attempt_checked: AtomicBool::new(false),
            clock: Box::new(clock),
        })
    }

    /// Builds a minimal invocation against a single-node fake engine,
    /// for tests that only need a live registrable object (not a full
    /// dispatch). Time is frozen at 0; use
    /// [`Invocation::new_for_test_with_clock`] for tests that need to
    /// advance it.
    #[cfg(any(test, feature = "testing"))]
    pub fn new_for_test(
        operation: impl Operation + 'static,
        try_count: u64,
        try_pause_millis: u64,
    ) -> Arc<Self> {
        Self::new_for_test_with_clock(operation, try_count, try_pause_millis).0
    }

    /// Same as [`Invocation::new_for_test`], returning the clock handle
    /// too so a test can advance it deterministically instead of
    /// depending on wall time.
    #[cfg(any(test, feature = "testing"))]
    pub fn new_for_test_with_clock(
        operation: impl Operation + 'static,
        try_count: u64,
        try_pause_millis: u64,
    ) -> (Arc<Self>, Arc<AtomicI64>) {
        let node_engine = crate::testing::FakeNodeEngine::single_node();
        let target = Target::Targeted {
            address: node_engine.this_address(),
        };
        let registry = Arc::new(InvocationRegistry::new());
        let clock = Arc::new(AtomicI64::new(0));
        let clock_for_closure = Arc::clone(&clock);
        let invocation = Self::new(
            "test-service",
            Box::new(operation),
            target,
            try_count,
            try_pause_millis,
            Box::new(crate::policy::PartitionExceptionPolicy),
            node_engine,
            registry,
            move || clock_for_closure.load(Ordering::SeqCst),
        );
        (invocation, clock)
    }

    pub fn future(&self) -> InvocationFuture {
        self.future.clone()
    }

    pub fn call_timeout_millis(&self) -> i64 {
        self.call_timeout
    }

    pub fn invoke_count(&self) -> u64 {
        self.invoke_count.load(Ordering::SeqCst)
    }

    pub fn backups_completed(&self) -> u64 {
        self.backups_completed.load(Ordering::SeqCst)
    }

    pub fn backups_expected(&self) -> u64 {
        self.pending.backups_expected.load(Ordering::SeqCst)
    }

    pub fn backup_overrun_total(&self) -> u64 {
        self.backup_overrun_total.load(Ordering::SeqCst)
    }

    pub fn target_member(&self) -> Option<Member> {
        *self.target_member.lock().unwrap()
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn call_id(&self) -> CallId {
        self.operation.lock().unwrap().call_id()
    }

    fn self_arc(&self) -> Arc<Self> {
        self.self_weak
            .upgrade()
            .expect("Invocation always holds a strong reference to itself while reachable")
    }

    // ------------------------------------------------------------------
    // Public contract (spec.md §4.10)
    // ------------------------------------------------------------------

    /// Dispatches synchronously on the calling thread and returns the
    /// future. Fails if this invocation (or its operation) was already
    /// invoked (spec invariant §3.1).
    pub fn invoke(self: &Arc<Self>) -> Result<InvocationFuture> {
        self.invoke_async()?;
        Ok(self.future.clone())
    }

    /// Same dispatch as `invoke`, without returning the future (callers
    /// who already hold one from construction use this).
    pub fn invoke_async(self: &Arc<Self>) -> Result<()> {
        if self.invoked.swap(true, Ordering::SeqCst) {
            return Err(InvocationError::AlreadyInvoked);
        }
        if !self.operation.lock().unwrap().call_id().is_unused() {
            return Err(InvocationError::AlreadyInvoked);
        }
        *self.invoking_thread.lock().unwrap() = Some(std::thread::current().id());
        self.do_invoke();
        Ok(())
    }

    /// The scheduler's re-entry point for retries (spec.md §4.10's
    /// `run()`). `invoke()` dispatches the first attempt synchronously
    /// on the calling thread; every attempt past the first reaches
    /// `do_invoke` through here instead, handed to `run` by
    /// `handle_retry_response` via `OperationService::submit_async` or
    /// `ExecutionService::schedule` rather than called inline from
    /// `notify` (spec.md §9's resolved open question on thread
    /// discipline).
    pub fn run(self: &Arc<Self>) {
        self.do_invoke();
    }

    fn do_invoke(self: &Arc<Self>) {
        if !self.node_engine.is_active() {
            self.notify(Response::Error(Fault::EngineNotActive));
            return;
        }

        self.invoke_count.fetch_add(1, Ordering::SeqCst);
        if !self.first_attempt_checked.swap(true, Ordering::SeqCst) {
            if let Some(invoking_thread) = *self.invoking_thread.lock().unwrap() {
                debug_assert_eq!(
                    std::thread::current().id(),
                    invoking_thread,
                    "first invocation attempt must dispatch on the caller's own thread"
                );
            }
        }

        let resolved = {
            let op = self.operation.lock().unwrap();
            init_invocation_target(self.target, &**op, &*self.node_engine)
        };
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(fault) => {
                self.notify(Response::Error(fault));
                return;
            }
        };

        *self.target_address.lock().unwrap() = Some(resolved.address);
        *self.target_member.lock().unwrap() = Some(resolved.member);
        self.remote.store(resolved.remote, Ordering::SeqCst);

        if resolved.remote {
            self.dispatch_remote(resolved.address);
        } else {
            self.dispatch_local();
        }
    }

    fn ensure_registered(self: &Arc<Self>) {
        let mut op = self.operation.lock().unwrap();
        if op.caller().is_none() {
            op.set_caller(self.node_engine.this_address(), self.node_engine.local_uuid());
        }
        if op.call_id().is_unused() {
            drop(op);
            let call_id = self.registry.register(self);
            op = self.operation.lock().unwrap();
            op.set_call_id(call_id);
        }
        op.set_invocation_time_millis(self.now());
        let sink: Weak<dyn ResponseSink> = self.self_weak.clone();
        op.set_response_sink(sink);
    }

    fn dispatch_local(self: &Arc<Self>) {
        self.ensure_registered();
        self.node_engine
            .operation_executor()
            .run_on_calling_thread_if_possible(Arc::clone(&self.operation));
    }

    fn dispatch_remote(self: &Arc<Self>, target: Address) {
        self.ensure_registered();
        let sent = self
            .node_engine
            .operation_service()
            .send(Arc::clone(&self.operation), target);
        if !sent {
            self.registry.deregister(self.call_id());
            self.notify(Response::Error(Fault::RetryableIo(
                "transport refused send".to_string(),
            )));
        }
    }

    // ------------------------------------------------------------------
    // notify (spec.md §4.2)
    // ------------------------------------------------------------------

    /// The single entry point for every signal the invocation can
    /// receive, from any thread. Safe to call concurrently; idempotent
    /// for duplicate terminal signals since completion itself is
    /// idempotent.
    pub fn notify(self: &Arc<Self>, response: Response) {
        match response {
            Response::Null => self.notify_normal_response(Box::new(()), 0),
            Response::CallTimeout => self.notify_call_timeout_response(),
            Response::Error(fault) => self.notify_error_response(fault),
            Response::Normal { value, backup_count } => {
                self.notify_normal_response(value, backup_count)
            }
            Response::Other(value) => {
                self.future.complete(Outcome::Value(value));
            }
        }
    }

    fn notify_error_response(self: &Arc<Self>, fault: Fault) {
        let invoke_count = self.invoke_count.load(Ordering::SeqCst);
        match self.policy.classify(&fault, invoke_count, self.try_count) {
            PolicyDecision::Retry => self.handle_retry_response(),
            PolicyDecision::ContinueWait => {
                // Recoverable wait (spec.md §7): debit the wait-aware op's
                // own timeout by the call timeout, same as a CallTimeout
                // response does, before scheduling the retry.
                let mut op = self.operation.lock().unwrap();
                if let Some(wait) = op.wait_support_mut() {
                    let remaining = wait.wait_timeout_millis() - self.call_timeout;
                    wait.set_wait_timeout_millis(remaining);
                }
                drop(op);
                self.handle_retry_response();
            }
            PolicyDecision::Throw => {
                self.future.complete(Outcome::Fault(fault));
            }
        }
    }

    /// §4.3. The mandatory publication order — `backups_expected` before
    /// the value — is what lets a concurrent backup-ack reader treat a
    /// non-null value as proof that `backups_expected` is already
    /// correct (spec.md §5's ordering guarantee 1).
    fn notify_normal_response(self: &Arc<Self>, value: Payload, expected_backups: u32) {
        let already_completed = self.backups_completed.load(Ordering::Acquire);
        if (expected_backups as u64) > already_completed {
            self.pending
                .received_at_millis
                .store(self.now(), Ordering::SeqCst);
            self.pending
                .backups_expected
                .store(expected_backups as u64, Ordering::Release);
            *self.pending.value.lock().unwrap() = Some(value);
            self.pending.has_value.store(true, Ordering::Release);

            let completed_now = self.backups_completed.load(Ordering::Acquire);
            if completed_now >= expected_backups as u64 {
                self.try_complete_from_pending();
            }
            // else: more backup acks are still outstanding; a later
            // `notify_one_backup_complete` (or the backup-timeout path)
            // will complete the future.
        } else {
            self.future.complete(Outcome::Value(value));
        }
    }

    /// §4.4. Each ack gets a distinct, monotonically increasing count
    /// from `fetch_add`. The call whose count reaches `backups_expected`
    /// exactly completes the future; a call that observes the count
    /// already past `backups_expected` (a race against
    /// `notify_normal_response` publishing after acks had already
    /// arrived) is counted as an overrun rather than retried for
    /// attribution, relying on the future's own single-assignment
    /// idempotency to avoid a lost wakeup (a deliberate relaxation of
    /// the exactly-once-observer contract — see DESIGN.md).
    pub fn notify_one_backup_complete(self: &Arc<Self>) {
        let new_count = self.backups_completed.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.pending.has_value.load(Ordering::Acquire) {
            return;
        }
        let expected = self.pending.backups_expected.load(Ordering::Acquire);
        if expected > new_count {
            return;
        }
        if expected < new_count {
            self.backup_overrun_total.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.try_complete_from_pending();
    }

    fn try_complete_from_pending(self: &Arc<Self>) {
        let value = self.pending.value.lock().unwrap().take();
        if let Some(value) = value {
            self.future.complete(Outcome::Value(value));
        }
    }

    // ------------------------------------------------------------------
    // Response handler entry point (spec.md §4.10's `sendResponse`)
    // ------------------------------------------------------------------

    /// Guards the single false→true transition of `response_received`
    /// before forwarding to `notify` (spec invariant §3.2).
    pub fn deliver_response(self: &Arc<Self>, response: Response) -> Result<()> {
        if self
            .response_received
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(InvocationError::ResponseAlreadySent);
        }
        self.notify(response);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timeouts (spec.md §4.5)
    // ------------------------------------------------------------------

    fn notify_call_timeout_response(self: &Arc<Self>) {
        {
            let mut op = self.operation.lock().unwrap();
            if let Some(wait) = op.wait_support_mut() {
                let remaining = wait.wait_timeout_millis() - self.call_timeout;
                wait.set_wait_timeout_millis(remaining);
            }
        }
        // Decremented here so the retry this triggers does not consume
        // a slot from the caller-visible retry budget (spec.md §3's
        // `invoke_count` note).
        self.invoke_count.fetch_sub(1, Ordering::SeqCst);
        self.handle_retry_response();
    }

    /// Driven by the monitor loop on every live invocation. A value
    /// already pending (backups outstanding) is explicitly left alone
    /// here (spec.md §4.5's first guard) — that case belongs to
    /// `check_backup_timeout`, which either accepts the pending value or
    /// re-drives the whole operation via `reset_and_reinvoke`. Completing
    /// the future with a timeout here instead would pre-empt that
    /// durability repair, since the future is single-assignment and the
    /// later `check_backup_timeout` call would simply no-op.
    pub fn notify_invocation_timeout(self: &Arc<Self>) {
        if self.pending.has_value.load(Ordering::Acquire) {
            return;
        }
        if self.future.waiting_threads() > 0 {
            return;
        }
        if self.future.is_infinite() {
            return;
        }
        let invocation_time = self.operation.lock().unwrap().invocation_time_millis();
        let expiration = invocation_time.saturating_add(self.future.max_call_timeout_millis());
        if self.now() < expiration {
            return;
        }
        let message = "operation timed out before a response arrived".to_string();
        self.future.complete(Outcome::Timeout(message));
    }

    /// Driven by the monitor loop at a cadence independent of the call
    /// timeout.
    pub fn check_backup_timeout(self: &Arc<Self>, timeout_millis: i64) {
        let expected = self.pending.backups_expected.load(Ordering::Acquire);
        let completed = self.backups_completed.load(Ordering::Acquire);
        if expected == completed {
            return;
        }
        let received = self.pending.received_at_millis.load(Ordering::SeqCst);
        if received == -1 {
            return;
        }
        let expiration = received.saturating_add(timeout_millis);
        if self.now() < expiration {
            return;
        }

        let target_address = *self.target_address.lock().unwrap();
        let target_still_member = target_address
            .and_then(|address| self.node_engine.cluster_service().member(address))
            .is_some();

        if target_still_member {
            // Target alive, backups just tardy: progress over strict
            // durability at this horizon (spec.md §4.5).
            self.try_complete_from_pending();
        } else {
            self.reset_and_reinvoke();
        }
    }

    /// The durability repair: the primary acknowledged a mutation but
    /// died before replicating it. Completing the future here would let
    /// a caller observe a value no node actually stores, so instead the
    /// operation is re-driven from scratch against whatever is now the
    /// primary.
    fn reset_and_reinvoke(self: &Arc<Self>) {
        self.invoke_count.store(0, Ordering::SeqCst);
        self.backups_completed.store(0, Ordering::SeqCst);
        self.pending.reset();
        self.handle_retry_response();
    }

    // ------------------------------------------------------------------
    // Retry scheduling (spec.md §4.7)
    // ------------------------------------------------------------------

    fn handle_retry_response(self: &Arc<Self>) {
        if self.future.is_interrupted() {
            self.future.complete(Outcome::Interrupted);
            return;
        }
        self.future.mark_retrying();

        let invoke_count = self.invoke_count.load(Ordering::SeqCst);
        self.log_retry(invoke_count);

        let this = Arc::clone(self);
        if invoke_count < MAX_FAST_INVOCATION_COUNT {
            self.node_engine
                .operation_service()
                .submit_async(Box::new(move || this.run()));
        } else {
            self.node_engine.execution_service().schedule(
                "cellmesh-invocation-retry",
                Duration::from_millis(self.try_pause_millis),
                Box::new(move || this.run()),
            );
        }
    }

    fn log_retry(&self, invoke_count: u64) {
        if invoke_count <= LOG_MAX_INVOCATION_COUNT {
            tracing::trace!(
                service = %self.service_name,
                invoke_count,
                "scheduling invocation retry"
            );
        } else if invoke_count % LOG_INVOCATION_COUNT_MOD == 0 {
            tracing::warn!(
                service = %self.service_name,
                invoke_count,
                "invocation has retried an unusually large number of times"
            );
        }
    }

    /// Blocks the calling thread for the derived call timeout and
    /// returns the shared outcome. Use [`Invocation::future`] directly
    /// for non-blocking or multi-waiter consumption.
    pub fn join(&self) -> std::result::Result<Arc<Outcome>, JoinError> {
        let deadline = deadline_from_millis(self.call_timeout);
        self.future.get(deadline).map_err(|_| JoinError::DeadlineExceeded)
    }
}

/// Errors surfaced by the blocking [`Invocation::join`] helper.
#[derive(Debug)]
pub enum JoinError {
    DeadlineExceeded,
}

impl ResponseSink for Invocation {
    fn send_response(&self, response: Response) {
        self.self_arc().deliver_response(response).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoopOperation;
    use cellmesh_types::{Fault, PartitionId, ReplicaIndex};
    use std::time::{Duration, Instant};

    fn deadline(millis: u64) -> Instant {
        Instant::now() + Duration::from_millis(millis)
    }

    #[test]
    fn normal_response_with_no_backups_completes_immediately() {
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        invocation.notify(Response::Normal {
            value: Box::new(7u32),
            backup_count: 0,
        });
        let outcome = invocation.future().get(deadline(50)).unwrap();
        assert!(matches!(&*outcome, Outcome::Value(_)));
    }

    #[test]
    fn normal_response_waits_for_backup_ack_before_completing() {
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        invocation.notify(Response::Normal {
            value: Box::new(7u32),
            backup_count: 1,
        });
        assert!(!invocation.future().is_done());
        invocation.notify_one_backup_complete();
        let outcome = invocation.future().get(deadline(50)).unwrap();
        assert!(matches!(&*outcome, Outcome::Value(_)));
    }

    #[test]
    fn backup_ack_arriving_before_value_still_completes() {
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        invocation.notify_one_backup_complete();
        invocation.notify(Response::Normal {
            value: Box::new(7u32),
            backup_count: 1,
        });
        let outcome = invocation.future().get(deadline(50)).unwrap();
        assert!(matches!(&*outcome, Outcome::Value(_)));
    }

    #[test]
    fn retryable_fault_retries_within_budget() {
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        invocation.invoke_async().unwrap();
        invocation.notify(Response::Error(Fault::RetryableIo("boom".into())));
        assert!(!invocation.future().is_done());
        assert_eq!(invocation.invoke_count(), 2);
    }

    #[test]
    fn retryable_fault_throws_once_budget_exhausted() {
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            1,
            10,
        );
        invocation.invoke_async().unwrap();
        invocation.notify(Response::Error(Fault::RetryableIo("boom".into())));
        let outcome = invocation.future().get(deadline(50)).unwrap();
        assert!(matches!(&*outcome, Outcome::Fault(Fault::RetryableIo(_))));
    }

    #[test]
    fn double_invoke_is_rejected() {
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        invocation.invoke_async().unwrap();
        assert!(invocation.invoke_async().is_err());
    }

    /// No response ever arrives, so `pending.has_value` stays unset and
    /// the overall call timeout is free to complete the future.
    #[test]
    fn invocation_timeout_fires_when_nothing_is_pending() {
        let (invocation, clock) = Invocation::new_for_test_with_clock(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        clock.store(invocation.call_timeout_millis() + 1, Ordering::SeqCst);
        invocation.notify_invocation_timeout();
        let outcome = invocation.future().get(deadline(50)).unwrap();
        assert!(matches!(&*outcome, Outcome::Timeout(_)));
    }

    /// A value already pending with backups outstanding is left alone
    /// by the overall call timeout — that case belongs entirely to
    /// `check_backup_timeout`'s durability repair.
    #[test]
    fn invocation_timeout_skips_when_a_value_is_already_pending() {
        let (invocation, clock) = Invocation::new_for_test_with_clock(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        invocation.notify(Response::Normal {
            value: Box::new(7u32),
            backup_count: 2,
        });
        clock.store(invocation.call_timeout_millis() + 1, Ordering::SeqCst);
        invocation.notify_invocation_timeout();
        assert!(!invocation.future().is_done());
    }

    #[test]
    fn send_response_twice_is_rejected() {
        let invocation = Invocation::new_for_test(
            NoopOperation::new(PartitionId::new(0), ReplicaIndex::PRIMARY),
            3,
            10,
        );
        invocation
            .deliver_response(Response::Normal {
                value: Box::new(1u32),
                backup_count: 0,
            })
            .unwrap();
        let err = invocation
            .deliver_response(Response::Normal {
                value: Box::new(2u32),
                backup_count: 0,
            })
            .unwrap_err();
        assert!(matches!(err, InvocationError::ResponseAlreadySent));
    }
}
