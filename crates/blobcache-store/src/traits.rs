use std::collections::HashMap;

use crate::error::StoreResult;

/// Minimal key-value view shared by every backend.
///
/// Backends keep richer inherent APIs (comments, codecs, first-vs-last
/// lookups); this trait only covers what all of them can answer:
/// - Reads are last-write-wins.
/// - A missing key is `Ok(None)` / `Ok(false)`, never an error.
/// - All I/O and decode errors are propagated, never silently ignored.
pub trait BlobStore: Send + Sync {
    /// Store `payload` under `key`, superseding any earlier value.
    fn write(&self, key: &str, payload: &[u8]) -> StoreResult<()>;

    /// Read the current payload for `key`.
    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether `key` currently has a payload.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// All distinct keys. No ordering guarantee.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Materialize every key and its current payload in memory.
    fn load_all(&self) -> StoreResult<HashMap<String, Vec<u8>>>;
}
