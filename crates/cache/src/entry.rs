use std::sync::Arc;

/// Ownership mode of a cache entry, fixed at insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The cache is the sole owner; the payload dies with the entry.
    Owned,
    /// Ownership is shared with outside holders; the payload dies with the
    /// last holder.
    Shared,
}

/// A cached payload under one of the two ownership modes.
pub enum CacheEntry<T> {
    Owned(Box<T>),
    Shared(Arc<T>),
}

impl<T> CacheEntry<T> {
    pub fn owned(payload: T) -> Self {
        Self::Owned(Box::new(payload))
    }

    pub fn shared(payload: Arc<T>) -> Self {
        Self::Shared(payload)
    }

    pub fn mode(&self) -> Ownership {
        match self {
            Self::Owned(_) => Ownership::Owned,
            Self::Shared(_) => Ownership::Shared,
        }
    }

    pub fn payload(&self) -> &T {
        match self {
            Self::Owned(payload) => payload,
            Self::Shared(payload) => payload,
        }
    }

    /// Extra share handle. `None` for owned entries.
    pub fn share(&self) -> Option<Arc<T>> {
        match self {
            Self::Owned(_) => None,
            Self::Shared(payload) => Some(Arc::clone(payload)),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("mode", &self.mode())
            .field("payload", self.payload())
            .finish()
    }
}
