//! Durable key-value blob stores.
//!
//! Two backends store opaque byte payloads under string keys:
//!
//! - [`SqliteStore`] -- one SQLite table in WAL mode. Rows are replaced in
//!   place, carry a free-text comment and are packed with a [`Codec`] whose
//!   tag is stored next to the value.
//! - [`ArchiveStore`] -- a plain tar file that only ever grows. Every put adds
//!   an entry; readers pick the first or last entry for a key. The file stays
//!   readable by ordinary tar tools.
//!
//! Callers pick a backend for their access pattern (random update vs. pure
//! append). Both also implement the small [`BlobStore`] trait for code that
//! only needs last-write-wins reads.
//!
//! # Design Rules
//!
//! 1. A missing key is a valid answer (`Ok(None)` / `Ok(false)`), never an error.
//! 2. All I/O and decode errors are propagated; nothing retries internally.
//! 3. A damaged archive entry aborts the whole scan instead of being skipped.
//! 4. Every operation is synchronous and guarded by the store's single lock.

pub mod archive;
pub mod config;
pub mod error;
pub mod sqlite;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use archive::{ArchiveStore, EntryMeta, Trailer, BLOCK_SIZE};
pub use blobcache_codec::Codec;
pub use config::{ArchiveConfig, SqliteConfig, StoreConfig};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use sqlite::{EntryInfo, SqliteStore};
pub use traits::BlobStore;
