use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Identity of a cached resource.
///
/// Either derived from a path plus load options (`from_path`) or taken
/// directly from an integer handle (`from_raw`). Uniqueness is the caller's
/// responsibility; nothing here generates fresh keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(pub u64);

impl ResourceKey {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Hash a resource path and its load options into a stable key.
    ///
    /// Path separators are normalized to `/`, so `a\b.obj` and `a/b.obj`
    /// map to the same key.
    pub fn from_path(path: impl AsRef<Path>, options: &[u8]) -> Self {
        let normalized = path.as_ref().to_string_lossy().replace('\\', "/");
        let mut hasher = Sha256::new();
        hasher.update((normalized.len() as u64).to_le_bytes());
        hasher.update(normalized.as_bytes());
        hasher.update(options);
        let result = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&result[..8]);
        Self(u64::from_le_bytes(bytes))
    }

    /// Key for a path loaded with default options.
    pub fn from_name(name: &str) -> Self {
        Self::from_path(name, &[])
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
