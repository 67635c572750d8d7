use crate::entry::{CacheEntry, Ownership};
use frameline_common::ResourceKey;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Errors from cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError<K: Debug> {
    #[error("no cache entry for key {0:?}")]
    NotFound(K),
    #[error("cache already holds an entry for key {0:?}")]
    DuplicateKey(K),
    #[error("cache entry {0:?} is owned and cannot be shared")]
    NotShared(K),
}

/// Rejected insert. Carries the entry back so the caller can retry under
/// another key or fall back to the resident entry.
#[derive(thiserror::Error)]
#[error("cache already holds an entry for key {key:?}")]
pub struct InsertError<T, K: Debug> {
    key: K,
    entry: CacheEntry<T>,
}

impl<T, K: Debug> InsertError<T, K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn mode(&self) -> Ownership {
        self.entry.mode()
    }

    /// Recover the entry that was not inserted.
    pub fn into_inner(self) -> CacheEntry<T> {
        self.entry
    }

    pub fn into_parts(self) -> (K, CacheEntry<T>) {
        (self.key, self.entry)
    }
}

impl<T, K: Debug> Debug for InsertError<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertError")
            .field("key", &self.key)
            .field("mode", &self.entry.mode())
            .finish()
    }
}

impl<T, K: Debug> From<InsertError<T, K>> for CacheError<K> {
    fn from(err: InsertError<T, K>) -> Self {
        CacheError::DuplicateKey(err.key)
    }
}

/// Read access to a cached payload.
///
/// Holds a recursive read lock: taking more refs on the same thread is
/// fine even while a writer waits, but calling `insert`, `remove` or
/// `clear` on the thread that holds one deadlocks. Drop it before the end
/// of the frame, or use [`Cache::with_cached`] / [`Cache::share`].
pub type CacheRef<'a, T> = MappedRwLockReadGuard<'a, T>;

/// Identity-keyed store with at most one resident entry per key.
///
/// Inserting under a key that is already present is rejected with an
/// [`InsertError`] that hands the entry back; nothing is ever overwritten
/// in place.
///
/// Readers use recursive read locks, so a thread holding a [`CacheRef`]
/// never queues behind a waiting writer.
///
/// Entries live in a `BTreeMap`, so [`keys`](Self::keys) is ordered.
pub struct Cache<T, K = ResourceKey> {
    entries: RwLock<BTreeMap<K, CacheEntry<T>>>,
}

impl<T, K> Default for Cache<T, K> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T, K> Cache<T, K>
where
    K: Ord + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entry. Fails if the key is already present, handing
    /// the entry back.
    pub fn insert(&self, key: K, entry: CacheEntry<T>) -> Result<(), InsertError<T, K>> {
        let mode = entry.mode();
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            drop(entries);
            tracing::debug!(?key, ?mode, "cache insert rejected: duplicate key");
            return Err(InsertError { key, entry });
        }
        entries.insert(key.clone(), entry);
        drop(entries);
        tracing::debug!(?key, ?mode, "cache insert");
        Ok(())
    }

    pub fn insert_owned(&self, key: K, payload: T) -> Result<(), InsertError<T, K>> {
        self.insert(key, CacheEntry::owned(payload))
    }

    pub fn insert_shared(&self, key: K, payload: Arc<T>) -> Result<(), InsertError<T, K>> {
        self.insert(key, CacheEntry::shared(payload))
    }

    /// Borrow the payload without taking ownership. See [`CacheRef`] for
    /// what the holder must not do.
    pub fn get_cached(&self, key: &K) -> Result<CacheRef<'_, T>, CacheError<K>> {
        let entries = self.entries.read_recursive();
        RwLockReadGuard::try_map(entries, |map| map.get(key).map(CacheEntry::payload))
            .map_err(|_| CacheError::NotFound(key.clone()))
    }

    /// Run `f` on the payload; the read lock is released when it returns.
    pub fn with_cached<R>(&self, key: &K, f: impl FnOnce(&T) -> R) -> Result<R, CacheError<K>> {
        let entries = self.entries.read_recursive();
        let entry = entries
            .get(key)
            .ok_or_else(|| CacheError::NotFound(key.clone()))?;
        Ok(f(entry.payload()))
    }

    /// Take an additional share of a `Shared` entry.
    pub fn share(&self, key: &K) -> Result<Arc<T>, CacheError<K>> {
        let entries = self.entries.read_recursive();
        let entry = entries
            .get(key)
            .ok_or_else(|| CacheError::NotFound(key.clone()))?;
        entry
            .share()
            .ok_or_else(|| CacheError::NotShared(key.clone()))
    }

    /// Evict an entry.
    ///
    /// The entry is unlinked under the write lock and destroyed after the
    /// lock is released, so no reader ever sees a half-destroyed payload.
    /// Owned payloads are destroyed here; shared payloads lose the cache's
    /// share and live on while outside holders remain.
    pub fn remove(&self, key: &K) -> Result<Ownership, CacheError<K>> {
        let entry = self
            .entries
            .write()
            .remove(key)
            .ok_or_else(|| CacheError::NotFound(key.clone()))?;
        let mode = entry.mode();
        drop(entry);
        tracing::debug!(?key, ?mode, "cache remove");
        Ok(mode)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.read_recursive().contains_key(key)
    }

    pub fn mode(&self, key: &K) -> Option<Ownership> {
        self.entries.read_recursive().get(key).map(CacheEntry::mode)
    }

    pub fn len(&self) -> usize {
        self.entries.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read_recursive().is_empty()
    }

    /// Ordered snapshot of the resident keys.
    pub fn keys(&self) -> Vec<K> {
        self.entries.read_recursive().keys().cloned().collect()
    }

    /// Evict everything. Returns how many entries were removed.
    pub fn clear(&self) -> usize {
        let taken = std::mem::take(&mut *self.entries.write());
        let n = taken.len();
        drop(taken);
        if n > 0 {
            tracing::debug!(entries = n, "cache cleared");
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    /// Payload that counts its own destruction.
    struct Tracked {
        name: &'static str,
        drops: Arc<AtomicUsize>,
    }

    impl Tracked {
        fn new(name: &'static str, drops: &Arc<AtomicUsize>) -> Self {
            Self {
                name,
                drops: Arc::clone(drops),
            }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::from_name(name)
    }

    #[test]
    fn insert_then_get() {
        let cache: Cache<u32> = Cache::new();
        cache.insert_owned(key("a"), 1).unwrap();
        assert!(cache.contains(&key("a")));
        assert_eq!(*cache.get_cached(&key("a")).unwrap(), 1);
        assert_eq!(cache.mode(&key("a")), Some(Ownership::Owned));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_key_is_not_found() {
        let cache: Cache<u32> = Cache::new();
        assert!(matches!(
            cache.get_cached(&key("nope")),
            Err(CacheError::NotFound(_))
        ));
        assert_eq!(cache.remove(&key("nope")), Err(CacheError::NotFound(key("nope"))));
        assert!(!cache.contains(&key("nope")));
    }

    #[test]
    fn duplicate_insert_is_rejected_and_hands_entry_back() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cache: Cache<Tracked> = Cache::new();
        cache.insert_owned(key("m"), Tracked::new("first", &drops)).unwrap();

        let err = cache
            .insert_owned(key("m"), Tracked::new("second", &drops))
            .unwrap_err();
        assert_eq!(err.key(), &key("m"));
        assert_eq!(err.mode(), Ownership::Owned);
        // Nothing destroyed: the resident entry stays, the rejected one is ours.
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(cache.get_cached(&key("m")).unwrap().name, "first");
        assert_eq!(cache.len(), 1);

        let CacheEntry::Owned(rejected) = err.into_inner() else {
            panic!("owned insert came back shared");
        };
        assert_eq!(rejected.name, "second");
        cache.insert(key("m2"), CacheEntry::Owned(rejected)).unwrap();
        assert_eq!(cache.get_cached(&key("m2")).unwrap().name, "second");
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejected_insert_converts_to_duplicate_key() {
        let cache: Cache<u32> = Cache::new();
        cache.insert_owned(key("k"), 1).unwrap();
        let err: CacheError<ResourceKey> = cache.insert_owned(key("k"), 2).unwrap_err().into();
        assert_eq!(err, CacheError::DuplicateKey(key("k")));
    }

    #[test]
    fn duplicate_shared_insert_leaves_outside_share_alive() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cache: Cache<Tracked> = Cache::new();
        cache
            .insert_shared(key("m"), Arc::new(Tracked::new("first", &drops)))
            .unwrap();

        let mine = Arc::new(Tracked::new("second", &drops));
        assert!(cache.insert_shared(key("m"), Arc::clone(&mine)).is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(mine.name, "second");
        assert_eq!(Arc::strong_count(&mine), 1);
    }

    #[test]
    fn removing_owned_entry_destroys_payload() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cache: Cache<Tracked> = Cache::new();
        cache.insert_owned(key("o"), Tracked::new("o", &drops)).unwrap();
        assert_eq!(cache.remove(&key("o")), Ok(Ownership::Owned));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!cache.contains(&key("o")));
    }

    #[test]
    fn shared_payload_outlives_removal_while_held() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cache: Cache<Tracked> = Cache::new();
        cache
            .insert_shared(key("mesh1"), Arc::new(Tracked::new("mesh1", &drops)))
            .unwrap();

        let held = cache.share(&key("mesh1")).unwrap();
        assert_eq!(cache.remove(&key("mesh1")), Ok(Ownership::Shared));

        assert!(!cache.contains(&key("mesh1")));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(held.name, "mesh1");

        drop(held);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn owned_entries_cannot_be_shared() {
        let cache: Cache<u32> = Cache::new();
        cache.insert_owned(key("o"), 1).unwrap();
        assert_eq!(cache.share(&key("o")), Err(CacheError::NotShared(key("o"))));
    }

    #[test]
    fn clear_destroys_owned_and_releases_shared() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cache: Cache<Tracked> = Cache::new();
        cache.insert_owned(key("a"), Tracked::new("a", &drops)).unwrap();
        cache
            .insert_shared(key("b"), Arc::new(Tracked::new("b", &drops)))
            .unwrap();
        let held = cache.share(&key("b")).unwrap();

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(held);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn keys_are_ordered() {
        let cache: Cache<&str, u32> = Cache::new();
        for k in [5, 1, 3] {
            cache.insert_owned(k, "x").unwrap();
        }
        assert_eq!(cache.keys(), vec![1, 3, 5]);
    }

    #[test]
    fn concurrent_inserts_on_distinct_keys() {
        let cache: Arc<Cache<usize, usize>> = Arc::new(Cache::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        let k = t * 100 + i;
                        cache.insert_owned(k, k).unwrap();
                        assert_eq!(*cache.get_cached(&k).unwrap(), k);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }

    #[test]
    fn racing_inserts_on_same_key_have_one_winner() {
        let cache: Arc<Cache<usize, &'static str>> = Arc::new(Cache::new());
        let racers: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.insert_owned("hot", t).is_ok())
            })
            .collect();
        let winners = racers
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn with_cached_reads_without_holding_a_guard() {
        let cache: Cache<Vec<u32>> = Cache::new();
        cache.insert_owned(key("v"), vec![1, 2, 3]).unwrap();
        let sum = cache.with_cached(&key("v"), |v| v.iter().sum::<u32>()).unwrap();
        assert_eq!(sum, 6);
        // Lock already released: writing from this thread is fine.
        cache.remove(&key("v")).unwrap();
        assert_eq!(
            cache.with_cached(&key("v"), |v| v.len()),
            Err(CacheError::NotFound(key("v")))
        );
    }

    #[test]
    fn second_ref_is_not_blocked_by_a_waiting_writer() {
        use std::sync::mpsc;
        use std::time::Duration;

        let cache: Arc<Cache<u32, u32>> = Arc::new(Cache::new());
        cache.insert_owned(1, 10).unwrap();
        cache.insert_owned(2, 20).unwrap();

        let (held_tx, held_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let reader_cache = Arc::clone(&cache);
        let reader = thread::spawn(move || {
            let first = reader_cache.get_cached(&1).unwrap();
            held_tx.send(()).unwrap();
            // Give the writer time to start waiting on the lock.
            thread::sleep(Duration::from_millis(50));
            let second = reader_cache.get_cached(&2).unwrap();
            done_tx.send(*first + *second).unwrap();
        });

        held_rx.recv().unwrap();
        let writer_cache = Arc::clone(&cache);
        let writer = thread::spawn(move || writer_cache.insert_owned(3, 30).is_ok());

        let total = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("reader hung behind a waiting writer");
        assert_eq!(total, 30);
        reader.join().unwrap();
        assert!(writer.join().unwrap());
        assert_eq!(cache.len(), 3);
    }

    /// Payload whose destruction is slow and observable.
    struct SlowDrop {
        live: AtomicBool,
    }

    impl SlowDrop {
        fn new() -> Self {
            Self {
                live: AtomicBool::new(true),
            }
        }

        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
    }

    impl Drop for SlowDrop {
        fn drop(&mut self) {
            self.live.store(false, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_micros(200));
        }
    }

    #[test]
    fn readers_never_see_a_payload_being_destroyed() {
        let cache: Arc<Cache<SlowDrop, u8>> = Arc::new(Cache::new());
        let stop = Arc::new(AtomicBool::new(false));

        let churn_cache = Arc::clone(&cache);
        let churn_stop = Arc::clone(&stop);
        let churn = thread::spawn(move || {
            for i in 0..300 {
                if i % 2 == 0 {
                    churn_cache.insert_shared(0, Arc::new(SlowDrop::new())).unwrap();
                } else {
                    churn_cache.insert_owned(0, SlowDrop::new()).unwrap();
                }
                churn_cache.remove(&0).unwrap();
            }
            churn_stop.store(true, Ordering::SeqCst);
        });

        while !stop.load(Ordering::SeqCst) {
            if cache.contains(&0) {
                // May be removed between the two calls; only liveness matters.
                if let Ok(r) = cache.get_cached(&0) {
                    assert!(r.is_live());
                }
            }
            match cache.share(&0) {
                Ok(shared) => assert!(shared.is_live()),
                Err(CacheError::NotFound(_)) | Err(CacheError::NotShared(_)) => {}
                Err(other) => panic!("unexpected {other:?}"),
            }
            assert!(cache.with_cached(&0, SlowDrop::is_live).unwrap_or(true));
        }
        churn.join().unwrap();
        assert!(!cache.contains(&0));
    }
}
