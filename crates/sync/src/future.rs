use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why an asynchronous operation produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("{0}")]
    Message(String),
    #[error("producer dropped without resolving")]
    Abandoned,
    #[error("producer panicked: {0}")]
    Panicked(String),
}

impl LoadError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Misuse of the producer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FutureError {
    #[error("future already resolved")]
    AlreadyResolved,
}

/// Observable state of a [`Future`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Ready,
    Failed,
}

enum Slot<T> {
    Pending,
    Ready(T),
    Failed(LoadError),
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    resolved: AtomicBool,
    cond: Condvar,
}

impl<T> Shared<T> {
    fn resolve(&self, outcome: Slot<T>) -> Result<(), FutureError> {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return Err(FutureError::AlreadyResolved);
        }
        *slot = outcome;
        self.resolved.store(true, Ordering::Release);
        drop(slot);
        self.cond.notify_all();
        Ok(())
    }
}

/// Create a pending future and the promise that resolves it.
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        resolved: AtomicBool::new(false),
        cond: Condvar::new(),
    });
    (
        Promise {
            shared: Arc::clone(&shared),
        },
        Future { shared },
    )
}

/// Producer side of a [`Future`]. Resolves it exactly once.
///
/// Dropping an unresolved promise fails the future with
/// [`LoadError::Abandoned`], so a consumer blocked in [`Future::get`] is
/// always released.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Promise<T> {
    /// `Pending -> Ready`.
    pub fn set_value(&self, value: T) -> Result<(), FutureError> {
        self.shared
            .resolve(Slot::Ready(value))
            .inspect_err(|_| report_double_resolve("set_value"))
    }

    /// `Pending -> Failed`.
    pub fn set_error(&self, error: LoadError) -> Result<(), FutureError> {
        self.shared
            .resolve(Slot::Failed(error))
            .inspect_err(|_| report_double_resolve("set_error"))
    }

    /// Resolve from a `Result`.
    pub fn complete(&self, result: Result<T, LoadError>) -> Result<(), FutureError> {
        match result {
            Ok(value) => self.set_value(value),
            Err(error) => self.set_error(error),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.resolved.load(Ordering::Acquire)
    }

    /// Another consumer handle for the same result.
    pub fn future(&self) -> Future<T> {
        Future {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Resolving twice is a producer bug: logged always, fatal in debug builds.
/// Unit tests of this crate observe the `Err` instead.
fn report_double_resolve(op: &str) {
    tracing::error!(op, "future already resolved");
    if cfg!(all(debug_assertions, not(test))) {
        panic!("{op} on a future that is already resolved");
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.is_resolved() && self.shared.resolve(Slot::Failed(LoadError::Abandoned)).is_ok() {
            tracing::warn!("promise dropped before resolving; future failed as abandoned");
        }
    }
}

/// Consumer side of an asynchronous result.
///
/// Clones observe the same result. There is no cancellation: a consumer
/// that loses interest just drops its handle while the producer runs to
/// completion.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future").field("state", &self.state()).finish()
    }
}

impl<T> Future<T> {
    /// Future that is already `Ready`.
    pub fn ready(value: T) -> Self {
        let (promise, future) = channel();
        let _ = promise.set_value(value);
        future
    }

    /// Future that is already `Failed`.
    pub fn failed(error: LoadError) -> Self {
        let (promise, future) = channel();
        let _ = promise.set_error(error);
        future
    }

    /// Whether a terminal state (`Ready` or `Failed`) has been reached.
    /// Never blocks; meant to be polled every frame.
    pub fn is_ready(&self) -> bool {
        self.shared.resolved.load(Ordering::Acquire)
    }

    pub fn state(&self) -> FutureState {
        match *self.shared.slot.lock() {
            Slot::Pending => FutureState::Pending,
            Slot::Ready(_) => FutureState::Ready,
            Slot::Failed(_) => FutureState::Failed,
        }
    }

    /// Block until the future is terminal.
    pub fn wait(&self) {
        let mut slot = self.shared.slot.lock();
        while matches!(*slot, Slot::Pending) {
            self.shared.cond.wait(&mut slot);
        }
    }

    /// Block for at most `timeout`. Returns whether the future is terminal.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut slot = self.shared.slot.lock();
        while matches!(*slot, Slot::Pending) {
            if self.shared.cond.wait_until(&mut slot, deadline).timed_out() {
                return !matches!(*slot, Slot::Pending);
            }
        }
        true
    }
}

impl<T: Clone> Future<T> {
    /// Block until terminal, then return the value or the stored failure.
    pub fn get(&self) -> Result<T, LoadError> {
        self.wait();
        self.try_get().unwrap_or(Err(LoadError::Abandoned))
    }

    /// `None` while pending.
    pub fn try_get(&self) -> Option<Result<T, LoadError>> {
        match &*self.shared.slot.lock() {
            Slot::Pending => None,
            Slot::Ready(value) => Some(Ok(value.clone())),
            Slot::Failed(error) => Some(Err(error.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_pending() {
        let (_promise, future) = channel::<u32>();
        assert!(!future.is_ready());
        assert_eq!(future.state(), FutureState::Pending);
        assert_eq!(future.try_get(), None);
    }

    #[test]
    fn set_value_makes_ready() {
        let (promise, future) = channel();
        promise.set_value(5u32).unwrap();
        assert!(future.is_ready());
        assert_eq!(future.state(), FutureState::Ready);
        assert_eq!(future.get(), Ok(5));
        assert_eq!(future.try_get(), Some(Ok(5)));
    }

    #[test]
    fn set_error_makes_failed() {
        let (promise, future) = channel::<u32>();
        promise.set_error(LoadError::msg("missing file")).unwrap();
        assert!(future.is_ready());
        assert_eq!(future.state(), FutureState::Failed);
        assert_eq!(future.get(), Err(LoadError::msg("missing file")));
    }

    #[test]
    fn second_set_value_is_rejected() {
        let (promise, future) = channel();
        promise.set_value(1u32).unwrap();
        assert_eq!(promise.set_value(2), Err(FutureError::AlreadyResolved));
        assert_eq!(future.get(), Ok(1));
    }

    #[test]
    fn set_error_after_value_is_rejected() {
        let (promise, future) = channel();
        promise.set_value("mesh").unwrap();
        assert_eq!(
            promise.set_error(LoadError::msg("late")),
            Err(FutureError::AlreadyResolved)
        );
        assert_eq!(future.state(), FutureState::Ready);
        assert_eq!(future.get(), Ok("mesh"));
    }

    #[test]
    fn dropped_promise_fails_as_abandoned() {
        let (promise, future) = channel::<u32>();
        drop(promise);
        assert!(future.is_ready());
        assert_eq!(future.get(), Err(LoadError::Abandoned));
    }

    #[test]
    fn resolution_is_visible_from_another_thread() {
        let (promise, future) = channel();
        let observer = {
            let future = future.clone();
            thread::spawn(move || {
                while !future.is_ready() {
                    thread::yield_now();
                }
                future.try_get()
            })
        };
        assert!(!future.is_ready());
        let producer = thread::spawn(move || promise.set_value(42u64));
        producer.join().unwrap().unwrap();
        assert_eq!(observer.join().unwrap(), Some(Ok(42)));
    }

    #[test]
    fn get_blocks_until_resolved() {
        let (promise, future) = channel();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.set_value(String::from("texture")).unwrap();
        });
        assert_eq!(future.get().as_deref(), Ok("texture"));
        producer.join().unwrap();
    }

    #[test]
    fn wait_timeout_expires_while_pending() {
        let (promise, future) = channel::<u32>();
        assert!(!future.wait_timeout(Duration::from_millis(10)));
        promise.set_value(3).unwrap();
        assert!(future.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn many_consumers_read_same_result() {
        let (promise, future) = channel();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let f = future.clone();
                thread::spawn(move || f.get())
            })
            .collect();
        promise.set_value(9u8).unwrap();
        for r in readers {
            assert_eq!(r.join().unwrap(), Ok(9));
        }
    }

    #[test]
    fn prebuilt_futures() {
        assert_eq!(Future::ready(1u8).get(), Ok(1));
        assert_eq!(
            Future::<u8>::failed(LoadError::Abandoned).state(),
            FutureState::Failed
        );
    }
}
