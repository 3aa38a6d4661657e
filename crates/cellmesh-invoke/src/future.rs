//! `InvocationFuture` (spec.md §2's 20% component).
//!
//! A single-assignment result cell shared by the invoker (the blocked or
//! polling waiter) and the `Invocation` (the completer). There is no
//! lock on `Invocation` itself; this is the one place in the engine that
//! does hold a lock, and only to guard the condition variable's
//! predicate — the single-assignment discipline is what actually
//! prevents racing completers from clobbering each other, not the lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cellmesh_types::{Fault, Payload};

/// A call timeout that never expires (spec.md §4.5: "if
/// `future.max_call_timeout == INFINITE`, skip").
pub const INFINITE: i64 = i64::MAX;

/// The terminal value an `InvocationFuture` is assigned exactly once.
/// Wrapped in `Arc` by the future itself so that more than one waiter
/// (a blocking `get` plus any number of `on_complete` callbacks) can
/// observe the same completion without requiring `Payload: Clone`.
pub enum Outcome {
    Value(Payload),
    Fault(Fault),
    Timeout(String),
    Interrupted,
}

impl Outcome {
    pub fn as_value(&self) -> Option<&Payload> {
        match self {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(_) => write!(f, "Outcome::Value(..)"),
            Outcome::Fault(fault) => write!(f, "Outcome::Fault({fault})"),
            Outcome::Timeout(msg) => write!(f, "Outcome::Timeout({msg})"),
            Outcome::Interrupted => write!(f, "Outcome::Interrupted"),
        }
    }
}

enum Slot {
    /// Nothing has completed the future yet; it may still be retried.
    Pending,
    /// A retry was just scheduled. Not terminal — exists only to wake
    /// blocked waiters so they re-check their own deadline even though
    /// the invocation keeps running (spec.md §4.7's "WAIT sentinel").
    Retrying,
    Done(Arc<Outcome>),
}

struct Inner {
    slot: Mutex<Slot>,
    condvar: Condvar,
    waiting_threads: AtomicUsize,
    interrupted: AtomicBool,
    /// The attempt's call timeout, fixed at construction. `INFINITE`
    /// disables `notifyInvocationTimeout` entirely for this invocation.
    max_call_timeout_millis: i64,
    callbacks: Mutex<Vec<Box<dyn FnOnce(&Outcome) + Send>>>,
}

/// Handle shared between the invoker and the `Invocation`. Cheap to
/// clone (it's an `Arc` around the real state).
#[derive(Clone)]
pub struct InvocationFuture {
    inner: Arc<Inner>,
}

impl InvocationFuture {
    pub fn new(max_call_timeout_millis: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Pending),
                condvar: Condvar::new(),
                waiting_threads: AtomicUsize::new(0),
                interrupted: AtomicBool::new(false),
                max_call_timeout_millis,
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn max_call_timeout_millis(&self) -> i64 {
        self.inner.max_call_timeout_millis
    }

    pub fn is_infinite(&self) -> bool {
        self.inner.max_call_timeout_millis == INFINITE
    }

    pub fn waiting_threads(&self) -> usize {
        self.inner.waiting_threads.load(Ordering::SeqCst)
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.inner.slot.lock().unwrap(), Slot::Done(_))
    }

    /// Sets the interrupt flag. Does not itself complete the future —
    /// the next retry attempt observes this flag and completes with
    /// `Outcome::Interrupted` (spec.md §5's cancellation model: no
    /// cooperative cancel of in-flight remote ops).
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.condvar.notify_all();
    }

    /// Marks a retry as scheduled without completing the future, waking
    /// any blocked waiter so it can re-check its own deadline.
    pub fn mark_retrying(&self) {
        let mut slot = self.inner.slot.lock().unwrap();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Retrying;
        }
        drop(slot);
        self.inner.condvar.notify_all();
    }

    /// Idempotent single-assignment completion. Returns `true` if this
    /// call is the one that actually completed the future; concurrent
    /// losers get `false` and must treat their own outcome as discarded
    /// (spec.md invariant 3 / concurrency guarantee 4).
    pub fn complete(&self, outcome: Outcome) -> bool {
        let outcome = Arc::new(outcome);
        let won = {
            let mut slot = self.inner.slot.lock().unwrap();
            if matches!(*slot, Slot::Done(_)) {
                false
            } else {
                *slot = Slot::Done(outcome.clone());
                true
            }
        };
        self.inner.condvar.notify_all();
        if won {
            for callback in std::mem::take(&mut *self.inner.callbacks.lock().unwrap()) {
                callback(&outcome);
            }
        }
        won
    }

    /// Registers an async callback. Fires immediately (on the calling
    /// thread) if the future is already done, otherwise queued for
    /// `complete` to fire under the completer's thread.
    pub fn on_complete(&self, callback: impl FnOnce(&Outcome) + Send + 'static) {
        let existing = {
            let slot = self.inner.slot.lock().unwrap();
            match &*slot {
                Slot::Done(outcome) => Some(outcome.clone()),
                _ => None,
            }
        };
        match existing {
            Some(outcome) => callback(&outcome),
            None => self.inner.callbacks.lock().unwrap().push(Box::new(callback)),
        }
    }

    /// Blocks the calling thread until the future completes or
    /// `deadline` passes. A `Slot::Retrying` wake-up does not end the
    /// wait — the caller's own deadline governs, per spec.md §4.5's
    /// "blocked waiters detect their own deadline".
    pub fn get(&self, deadline: Instant) -> Result<Arc<Outcome>, TimedOut> {
        self.inner.waiting_threads.fetch_add(1, Ordering::SeqCst);
        let result = self.wait_inner(deadline);
        self.inner.waiting_threads.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn wait_inner(&self, deadline: Instant) -> Result<Arc<Outcome>, TimedOut> {
        let mut slot = self.inner.slot.lock().unwrap();
        loop {
            if let Slot::Done(outcome) = &*slot {
                return Ok(outcome.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TimedOut);
            }
            let (guard, timed_out) = self
                .inner
                .condvar
                .wait_timeout(slot, deadline - now)
                .unwrap();
            slot = guard;
            if timed_out.timed_out() {
                if let Slot::Done(outcome) = &*slot {
                    return Ok(outcome.clone());
                }
                return Err(TimedOut);
            }
        }
    }
}

/// Blocking wait exceeded its deadline without the future completing.
#[derive(Debug, Clone, Copy)]
pub struct TimedOut;

/// Converts a caller-supplied timeout budget into a concrete deadline,
/// treating non-positive and `INFINITE` alike as "don't time out here"
/// (the invocation's own call-timeout machinery, not the waiter's
/// `get`, is what bounds those).
pub fn deadline_from_millis(millis: i64) -> Instant {
    if millis <= 0 || millis == INFINITE {
        Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
    } else {
        Instant::now() + Duration::from_millis(millis as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_assignment_first_writer_wins() {
        let future = InvocationFuture::new(1_000);
        assert!(future.complete(Outcome::Value(Box::new(1u32))));
        assert!(!future.complete(Outcome::Value(Box::new(2u32))));
        let outcome = future.get(Instant::now() + Duration::from_millis(10)).unwrap();
        let value = outcome.as_value().unwrap().downcast_ref::<u32>().unwrap();
        assert_eq!(*value, 1);
    }

    #[test]
    fn get_times_out_while_pending() {
        let future = InvocationFuture::new(1_000);
        let result = future.get(Instant::now() + Duration::from_millis(20));
        assert!(result.is_err());
    }

    #[test]
    fn waiting_threads_counts_blocked_callers() {
        let future = InvocationFuture::new(1_000);
        let f2 = future.clone();
        let handle = thread::spawn(move || {
            let _ = f2.get(Instant::now() + Duration::from_millis(200));
        });
        // Give the spawned thread a chance to start waiting.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(future.waiting_threads(), 1);
        future.complete(Outcome::Interrupted);
        handle.join().unwrap();
        assert_eq!(future.waiting_threads(), 0);
    }

    #[test]
    fn retrying_wakeup_does_not_complete() {
        let future = InvocationFuture::new(1_000);
        future.mark_retrying();
        assert!(!future.is_done());
    }
}
