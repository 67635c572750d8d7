//! Concurrency primitives shared by loader threads and the render thread.
//!
//! # Invariants
//! - Queue order is FIFO across all producers; no item is duplicated or
//!   dropped silently (rejected pushes hand the item back).
//! - A future resolves exactly once. `Pending -> Ready` or
//!   `Pending -> Failed`, nothing after that.
//! - Only `Future::get`/`wait` and `ConcurrentQueue::pop` (and `push` on a
//!   full bounded queue) ever block.

mod future;
mod queue;

pub use future::{Future, FutureError, FutureState, LoadError, Promise, channel};
pub use queue::{ConcurrentQueue, PushError};

pub fn crate_info() -> &'static str {
    "frameline-sync v0.1.0"
}
