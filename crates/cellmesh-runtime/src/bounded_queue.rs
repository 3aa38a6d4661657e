//! Bounded job queue with backpressure for the operation worker pool.
//!
//! Built on `crossbeam-queue::ArrayQueue` for a lock-free, bounded MPMC
//! queue. When full, `try_push` hands the job back to the caller
//! instead of growing unbounded memory for retries piling up faster
//! than the pool can drain them.

use crossbeam_queue::ArrayQueue;

#[derive(Debug)]
pub enum PushResult<T> {
    Ok,
    Backpressure(T),
}

pub struct BoundedQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    pub fn try_push(&self, item: T) -> PushResult<T> {
        match self.inner.push(item) {
            Ok(()) => PushResult::Ok,
            Err(item) => PushResult::Backpressure(item),
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_push_pop() {
        let q = BoundedQueue::new(3);
        assert!(matches!(q.try_push(1), PushResult::Ok));
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn backpressure_when_full() {
        let q = BoundedQueue::new(1);
        assert!(matches!(q.try_push(1), PushResult::Ok));
        match q.try_push(2) {
            PushResult::Backpressure(v) => assert_eq!(v, 2),
            PushResult::Ok => panic!("expected backpressure"),
        }
    }

    #[test]
    #[should_panic(expected = "queue capacity must be positive")]
    fn zero_capacity_panics() {
        let _q: BoundedQueue<i32> = BoundedQueue::new(0);
    }
}
