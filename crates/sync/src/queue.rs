use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Rejected push. Carries the item back so nothing is dropped silently.
#[derive(thiserror::Error)]
pub enum PushError<T> {
    #[error("queue is closed")]
    Closed(T),
    #[error("queue is full")]
    Full(T),
}

impl<T> PushError<T> {
    /// Recover the item that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) | Self::Full(item) => item,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Full(_) => f.write_str("Full(..)"),
        }
    }
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe FIFO of work items.
///
/// Any number of producers may push. The intended consumer is a single
/// thread (the render thread drains once per frame), but `pop` and `drain`
/// are safe to call from several threads at once.
///
/// A bounded queue makes `push` wait for space and `try_push` fail with
/// [`PushError::Full`]. After [`close`](Self::close) every push is rejected
/// with [`PushError::Closed`]; items already queued can still be popped.
pub struct ConcurrentQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> ConcurrentQueue<T> {
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Queue holding at most `capacity` items (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue an item, waiting for space if the queue is bounded and full.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(PushError::Closed(item));
            }
            if !self.is_full(&inner) {
                break;
            }
            self.not_full.wait(&mut inner);
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue without waiting. Fails with `Full` when a bounded queue has
    /// no room.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PushError::Closed(item));
        }
        if self.is_full(&inner) {
            return Err(PushError::Full(item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, waiting up to `timeout` while the queue is
    /// empty.
    ///
    /// `Duration::ZERO` polls, `Duration::MAX` waits until an item arrives
    /// or the queue is closed. Returns `None` on expiry, or immediately once
    /// the queue is closed and empty.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed || timeout.is_zero() {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                        let item = inner.items.pop_front();
                        drop(inner);
                        if item.is_some() {
                            self.not_full.notify_one();
                        }
                        return item;
                    }
                }
                None => self.not_empty.wait(&mut inner),
            }
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.pop(Duration::ZERO)
    }

    /// Atomically remove up to `max_items` items in FIFO order.
    pub fn drain(&self, max_items: usize) -> Vec<T> {
        let mut inner = self.inner.lock();
        let n = inner.items.len().min(max_items);
        let out: Vec<T> = inner.items.drain(..n).collect();
        drop(inner);
        if !out.is_empty() {
            self.not_full.notify_all();
        }
        out
    }

    /// Stop accepting items and wake every waiter.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);
        tracing::debug!("queue closed");
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn is_full(&self, inner: &Inner<T>) -> bool {
        self.capacity.is_some_and(|cap| inner.items.len() >= cap)
    }
}
