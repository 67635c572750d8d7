//! Resource cache: identity deduplication for decoded assets.
//!
//! Loader threads publish decoded payloads here; the render thread reads
//! them while building the frame. Entries are either owned by the cache or
//! shared with outside holders, decided at insertion and never changed.
//!
//! # Invariants
//! - At most one entry per key. A colliding insert is rejected
//!   (`InsertError`, which hands the entry back), never silently
//!   overwritten.
//! - A removed entry is unlinked before its payload is destroyed.
//! - A shared payload is destroyed only when its last holder releases it.
//!
//! No size-bounded eviction: entries leave only through `remove`/`clear`.

mod cache;
mod entry;

pub use cache::{Cache, CacheError, CacheRef, InsertError};
pub use entry::{CacheEntry, Ownership};

pub fn crate_info() -> &'static str {
    "frameline-cache v0.1.0"
}
