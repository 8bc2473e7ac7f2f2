use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Instant;

use blobcache_codec::Codec;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::config::SqliteConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache (
    key     TEXT     NOT NULL PRIMARY KEY,
    created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    comment TEXT     NOT NULL,
    codec   TEXT     NOT NULL,
    value   BLOB
);
";

/// Metadata of a single row, without its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    /// Time of the latest `put` for this key (UTC).
    pub created: NaiveDateTime,
    pub comment: String,
    pub codec: Codec,
    /// Packed size on disk; `None` when the row has no value.
    pub stored_len: Option<u64>,
}

/// Durable blob store backed by a single SQLite table in WAL mode.
///
/// Every operation goes through one readers-writer lock: `put`, `remove` and
/// `vacuum` hold it exclusively, everything else shares it. That gives
/// per-call consistency only; there are no multi-call transactions.
///
/// SQLite connections cannot be shared between threads, so the store keeps a
/// small pool of connections to the same file. WAL journaling lets the pooled
/// connections read concurrently.
pub struct SqliteStore {
    path: PathBuf,
    config: SqliteConfig,
    lock: RwLock<()>,
    idle: Mutex<Vec<Connection>>,
    closed: bool,
}

impl SqliteStore {
    /// Open the store at `path`, creating the file and its schema on first use.
    pub fn open(path: impl AsRef<Path>, config: SqliteConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "opening sqlite blob store");

        let create = needs_schema(&path)?;
        if create {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = open_connection(&path, &config)?;
        if create {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn.execute_batch(SCHEMA)?;
            debug!(path = %path.display(), journal_mode = %mode, "created store schema");
        }

        Ok(Self {
            path,
            config,
            lock: RwLock::new(()),
            idle: Mutex::new(vec![conn]),
            closed: false,
        })
    }

    /// Checkpoint the write-ahead log into the main file and release every
    /// connection. Failures are logged, not returned.
    pub fn close(mut self) {
        self.shutdown();
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the backing file to reclaim free pages. Slow; not meant for
    /// the hot path.
    pub fn vacuum(&self) -> StoreResult<()> {
        let _guard = self.lock.write().expect("store lock poisoned");
        info!(path = %self.path.display(), "vacuum started");
        let started = Instant::now();
        self.with_connection(|conn| Ok(conn.execute_batch("VACUUM")?))?;
        info!(
            path = %self.path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "vacuum finished"
        );
        Ok(())
    }

    /// Returns `true` if `key` has a non-null value.
    pub fn contains(&self, key: &str) -> StoreResult<bool> {
        let _guard = self.lock.read().expect("store lock poisoned");
        self.with_connection(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM cache WHERE key = ?1 AND value IS NOT NULL",
                    [key],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Insert or fully replace the row for `key`.
    ///
    /// The payload is packed with `codec` before it is written; the codec
    /// tag is stored in the row so `get` can unpack it.
    pub fn put(&self, key: &str, comment: &str, payload: &[u8], codec: Codec) -> StoreResult<()> {
        let value = codec.pack(payload)?;

        let _guard = self.lock.write().expect("store lock poisoned");
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache (key, comment, codec, value) VALUES (?1, ?2, ?3, ?4)",
                params![key, comment, codec.tag(), value],
            )?;
            Ok(())
        })?;

        debug!(key, %codec, raw_len = payload.len(), stored_len = value.len(), "put");
        Ok(())
    }

    /// Read and unpack the payload for `key`.
    pub fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let _guard = self.lock.read().expect("store lock poisoned");
        let row = self.with_connection(|conn| {
            let row = conn
                .query_row("SELECT codec, value FROM cache WHERE key = ?1", [key], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<Vec<u8>>>(1)?))
                })
                .optional()?;
            Ok(row)
        })?;

        match row {
            Some((tag, Some(value))) => Ok(Some(Codec::from_tag(&tag)?.unpack(&value)?)),
            _ => Ok(None),
        }
    }

    /// Read the comment stored with `key`.
    pub fn get_comment(&self, key: &str) -> StoreResult<Option<String>> {
        let _guard = self.lock.read().expect("store lock poisoned");
        self.with_connection(|conn| {
            let comment = conn
                .query_row("SELECT comment FROM cache WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(comment)
        })
    }

    /// Row metadata for `key`, without unpacking the payload.
    pub fn entry_info(&self, key: &str) -> StoreResult<Option<EntryInfo>> {
        let _guard = self.lock.read().expect("store lock poisoned");
        let row = self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT created, comment, codec, length(value) FROM cache WHERE key = ?1",
                    [key],
                    |row| {
                        Ok((
                            row.get::<_, NaiveDateTime>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;

        let Some((created, comment, tag, stored_len)) = row else {
            return Ok(None);
        };
        Ok(Some(EntryInfo {
            key: key.to_string(),
            created,
            comment,
            codec: Codec::from_tag(&tag)?,
            stored_len: stored_len.map(|len| len as u64),
        }))
    }

    /// Delete the row for `key`. Returns `true` if a row was removed.
    pub fn remove(&self, key: &str) -> StoreResult<bool> {
        let _guard = self.lock.write().expect("store lock poisoned");
        let removed = self.with_connection(|conn| {
            Ok(conn.execute("DELETE FROM cache WHERE key = ?1", [key])?)
        })?;
        debug!(key, removed, "remove");
        Ok(removed > 0)
    }

    /// All keys in the store, in whatever order SQLite returns them.
    pub fn list_keys(&self) -> StoreResult<Vec<String>> {
        let _guard = self.lock.read().expect("store lock poisoned");
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM cache")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    /// Unpack every row into memory. Memory use is the sum of the unpacked
    /// payload sizes. Any undecodable row fails the whole load.
    pub fn load_all(&self) -> StoreResult<HashMap<String, Vec<u8>>> {
        let _guard = self.lock.read().expect("store lock poisoned");
        let rows = self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, codec, value FROM cache WHERE value IS NOT NULL")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(key, tag, value)| -> StoreResult<(String, Vec<u8>)> {
                let payload = Codec::from_tag(&tag)?.unpack(&value)?;
                Ok((key, payload))
            })
            .collect()
    }

    /// Store the contents of a file.
    ///
    /// The key is the file name when `use_basename_as_key` is set, otherwise
    /// the path as given. The payload is zstd-packed when `always_compress`
    /// is set and uses the configured default codec otherwise. Returns the
    /// key that was written.
    pub fn put_file(
        &self,
        path: impl AsRef<Path>,
        use_basename_as_key: bool,
        always_compress: bool,
    ) -> StoreResult<String> {
        let path = path.as_ref();
        let data = fs::read(path)?;

        let key = if use_basename_as_key {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?
        } else {
            path.to_string_lossy().into_owned()
        };
        let codec = if always_compress {
            Codec::Zstd
        } else {
            self.config.default_codec
        };

        self.put(&key, "", &data, codec)?;
        Ok(key)
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let pooled = self.idle.lock().expect("connection pool poisoned").pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => open_connection(&self.path, &self.config)?,
        };

        let result = f(&conn);

        let mut idle = self.idle.lock().expect("connection pool poisoned");
        if idle.len() < self.config.max_idle_connections.max(1) {
            idle.push(conn);
        }
        result
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut conns = std::mem::take(self.idle.get_mut().unwrap_or_else(PoisonError::into_inner));
        let conn = match conns.pop() {
            Some(conn) => conn,
            None => match open_connection(&self.path, &self.config) {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "cannot open connection for final checkpoint"
                    );
                    return;
                }
            },
        };
        // Other connections must be gone before the log can be truncated.
        drop(conns);

        match checkpoint(&conn) {
            Ok(cp) if cp.busy => warn!(
                path = %self.path.display(),
                log_frames = cp.log_frames,
                checkpointed_frames = cp.checkpointed_frames,
                "WAL checkpoint blocked by another connection, log left in place"
            ),
            Ok(_) => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "WAL checkpoint failed"),
        }
        if let Err((_, e)) = conn.close() {
            warn!(path = %self.path.display(), error = %e, "closing database failed");
        }
        info!(path = %self.path.display(), "closed sqlite blob store");
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl BlobStore for SqliteStore {
    fn write(&self, key: &str, payload: &[u8]) -> StoreResult<()> {
        self.put(key, "", payload, self.config.default_codec)
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.get(key)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.contains(key)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.list_keys()
    }

    fn load_all(&self) -> StoreResult<HashMap<String, Vec<u8>>> {
        SqliteStore::load_all(self)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("closed", &self.closed)
            .finish()
    }
}

/// A missing or zero-length file has no schema yet.
fn needs_schema(path: &Path) -> StoreResult<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::metadata(path)?.len() == 0)
}

/// Result row of `PRAGMA wal_checkpoint`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Checkpoint {
    /// Another connection kept the checkpoint from completing.
    busy: bool,
    log_frames: i64,
    checkpointed_frames: i64,
}

/// Copy the whole log into the database and truncate it to zero bytes.
fn checkpoint(conn: &Connection) -> rusqlite::Result<Checkpoint> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
        Ok(Checkpoint {
            busy: row.get::<_, i64>(0)? != 0,
            log_frames: row.get(1)?,
            checkpointed_frames: row.get(2)?,
        })
    })
}

fn open_connection(path: &Path, config: &SqliteConfig) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(config.busy_timeout())?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            SqliteStore::open(dir.path().join("cache.db"), SqliteConfig::default()).unwrap();
        (dir, store)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn open_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let store = SqliteStore::open(&path, SqliteConfig::default()).unwrap();
        assert!(path.exists());
        assert!(store.list_keys().unwrap().is_empty());

        let mode: String = store
            .with_connection(|conn| {
                Ok(conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn reopen_is_idempotent_and_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let store = SqliteStore::open(&path, SqliteConfig::default()).unwrap();
        store.put("a", "first", b"alpha", Codec::Zstd).unwrap();
        store.put("b", "", b"beta", Codec::Deflate).unwrap();
        store.put("c", "", b"gamma", Codec::None).unwrap();
        store.close();

        let store = SqliteStore::open(&path, SqliteConfig::default()).unwrap();
        assert_eq!(store.get("a").unwrap().unwrap(), b"alpha");
        assert_eq!(store.get("b").unwrap().unwrap(), b"beta");
        assert_eq!(store.get("c").unwrap().unwrap(), b"gamma");
        assert_eq!(store.get_comment("a").unwrap().as_deref(), Some("first"));
        assert_eq!(store.list_keys().unwrap().len(), 3);
    }

    #[test]
    fn close_leaves_no_pending_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let store = SqliteStore::open(&path, SqliteConfig::default()).unwrap();
        for i in 0..20 {
            store.put(&format!("k{i}"), "", &[i as u8; 4096], Codec::None).unwrap();
        }
        store.close();

        let wal = dir.path().join("cache.db-wal");
        assert!(!wal.exists() || fs::metadata(&wal).unwrap().len() == 0);
    }

    #[test]
    fn drop_also_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = SqliteStore::open(&path, SqliteConfig::default()).unwrap();
            store.put("k", "", b"v", Codec::None).unwrap();
        }
        let store = SqliteStore::open(&path, SqliteConfig::default()).unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"v");
    }

    #[test]
    fn checkpoint_reports_open_reader_as_busy() {
        let (dir, store) = open_temp();
        store.put("k", "", b"v", Codec::None).unwrap();
        let path = dir.path().join("cache.db");

        let reader = Connection::open(&path).unwrap();
        reader.execute_batch("BEGIN").unwrap();
        let rows: i64 = reader
            .query_row("SELECT count(*) FROM cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);

        let conn = Connection::open(&path).unwrap();
        conn.busy_timeout(std::time::Duration::ZERO).unwrap();
        assert!(checkpoint(&conn).unwrap().busy);

        reader.execute_batch("COMMIT").unwrap();
        assert!(!checkpoint(&conn).unwrap().busy);
    }

    #[test]
    fn open_in_missing_location_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file cannot be used as a parent directory.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let err = SqliteStore::open(blocker.join("cache.db"), SqliteConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn roundtrip_every_codec() {
        let (_dir, store) = open_temp();
        let payload = b"The quick brown fox jumps over the lazy dog. ".repeat(20);
        for codec in Codec::ALL {
            let key = format!("blob-{codec}");
            store.put(&key, "", &payload, codec).unwrap();
            assert_eq!(store.get(&key).unwrap().unwrap(), payload, "codec {codec}");
        }
    }

    #[test]
    fn scenario_put_contains_get_remove() {
        let (_dir, store) = open_temp();
        store.put("a.txt", "desc", b"hello world", Codec::Zstd).unwrap();
        assert!(store.contains("a.txt").unwrap());
        assert_eq!(store.get("a.txt").unwrap().unwrap(), b"hello world");
        assert!(store.remove("a.txt").unwrap());
        assert!(!store.contains("a.txt").unwrap());
    }

    #[test]
    fn overwrite_replaces_row() {
        let (_dir, store) = open_temp();
        store.put("k", "old", b"v1", Codec::Deflate).unwrap();
        store.put("k", "new", b"v2", Codec::None).unwrap();

        assert_eq!(store.get("k").unwrap().unwrap(), b"v2");
        assert_eq!(store.get_comment("k").unwrap().as_deref(), Some("new"));
        let keys = store.list_keys().unwrap();
        assert_eq!(keys.iter().filter(|k| *k == "k").count(), 1);

        let info = store.entry_info("k").unwrap().unwrap();
        assert_eq!(info.codec, Codec::None);
        assert_eq!(info.stored_len, Some(2));
    }

    #[test]
    fn absent_key_is_not_an_error() {
        let (_dir, store) = open_temp();
        assert!(!store.contains("missing").unwrap());
        assert!(store.get("missing").unwrap().is_none());
        assert!(store.get_comment("missing").unwrap().is_none());
        assert!(store.entry_info("missing").unwrap().is_none());
        assert!(!store.remove("missing").unwrap());
    }

    #[test]
    fn empty_payload_is_present() {
        let (_dir, store) = open_temp();
        store.put("empty", "", b"", Codec::Zstd).unwrap();
        assert!(store.contains("empty").unwrap());
        assert_eq!(store.get("empty").unwrap().unwrap(), b"");
    }

    #[test]
    fn null_value_reads_as_absent() {
        let (_dir, store) = open_temp();
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO cache (key, comment, codec, value) VALUES ('hole', 'c', '', NULL)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        assert!(!store.contains("hole").unwrap());
        assert!(store.get("hole").unwrap().is_none());
        assert_eq!(store.get_comment("hole").unwrap().as_deref(), Some("c"));
        assert!(store.load_all().unwrap().is_empty());
        assert_eq!(store.entry_info("hole").unwrap().unwrap().stored_len, None);
    }

    #[test]
    fn load_all_unpacks_every_row() {
        let (_dir, store) = open_temp();
        store.put("x", "", b"one", Codec::None).unwrap();
        store.put("y", "", b"two", Codec::Deflate).unwrap();
        store.put("z", "", b"three", Codec::Zstd).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all["x"], b"one");
        assert_eq!(all["y"], b"two");
        assert_eq!(all["z"], b"three");
    }

    // -----------------------------------------------------------------------
    // Codec failures
    // -----------------------------------------------------------------------

    fn insert_raw(store: &SqliteStore, key: &str, tag: &str, value: &[u8]) {
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO cache (key, comment, codec, value) \
                     VALUES (?1, '', ?2, ?3)",
                    params![key, tag, value],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn unknown_stored_codec_is_unsupported() {
        let (_dir, store) = open_temp();
        insert_raw(&store, "odd", "lz4", b"whatever");
        let err = store.get("odd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCodec);
        assert!(matches!(
            store.load_all().unwrap_err(),
            StoreError::UnsupportedCodec(tag) if tag == "lz4"
        ));
    }

    #[test]
    fn corrupt_payload_is_corrupt_data() {
        let (_dir, store) = open_temp();
        insert_raw(&store, "bad", "zstd", b"not a zstd frame at all");
        let err = store.get("bad").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn legacy_zlib_rows_are_readable() {
        let (_dir, store) = open_temp();
        let packed = Codec::Deflate.pack(b"legacy").unwrap();
        insert_raw(&store, "old", "zlib", &packed);
        assert_eq!(store.get("old").unwrap().unwrap(), b"legacy");
    }

    // -----------------------------------------------------------------------
    // Files and maintenance
    // -----------------------------------------------------------------------

    #[test]
    fn put_file_derives_key() {
        let (dir, store) = open_temp();
        let file = dir.path().join("report.csv");
        fs::write(&file, b"a,b,c\n1,2,3\n").unwrap();

        let key = store.put_file(&file, true, true).unwrap();
        assert_eq!(key, "report.csv");
        assert_eq!(store.get("report.csv").unwrap().unwrap(), b"a,b,c\n1,2,3\n");
        assert_eq!(store.entry_info("report.csv").unwrap().unwrap().codec, Codec::Zstd);

        let full = store.put_file(&file, false, false).unwrap();
        assert_eq!(full, file.to_string_lossy());
        assert_eq!(
            store.entry_info(&full).unwrap().unwrap().codec,
            SqliteConfig::default().default_codec
        );
    }

    #[test]
    fn put_file_missing_is_io_error() {
        let (dir, store) = open_temp();
        let err = store.put_file(dir.path().join("nope"), true, false).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn vacuum_keeps_data() {
        let (_dir, store) = open_temp();
        for i in 0..50 {
            store.put(&format!("k{i}"), "", &vec![i as u8; 2048], Codec::None).unwrap();
        }
        for i in 0..40 {
            assert!(store.remove(&format!("k{i}")).unwrap());
        }
        store.vacuum().unwrap();
        assert_eq!(store.list_keys().unwrap().len(), 10);
        assert_eq!(store.get("k45").unwrap().unwrap(), vec![45u8; 2048]);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_writers_with_distinct_keys() {
        let (_dir, store) = open_temp();
        std::thread::scope(|s| {
            for i in 0..16 {
                let store = &store;
                s.spawn(move || {
                    let payload = format!("payload-{i}").repeat(10);
                    store.put(&format!("key-{i}"), "", payload.as_bytes(), Codec::Zstd).unwrap();
                });
            }
        });

        assert_eq!(store.list_keys().unwrap().len(), 16);
        for i in 0..16 {
            let expected = format!("payload-{i}").repeat(10);
            assert_eq!(store.get(&format!("key-{i}")).unwrap().unwrap(), expected.as_bytes());
        }
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let (_dir, store) = open_temp();
        store.put("shared", "", b"seed", Codec::None).unwrap();
        std::thread::scope(|s| {
            for i in 0..4 {
                let store = &store;
                s.spawn(move || {
                    for j in 0..25 {
                        store.put(&format!("w{i}-{j}"), "", b"data", Codec::Deflate).unwrap();
                    }
                });
                s.spawn(move || {
                    for _ in 0..25 {
                        assert_eq!(store.get("shared").unwrap().unwrap(), b"seed");
                    }
                });
            }
        });
        assert_eq!(store.list_keys().unwrap().len(), 101);
    }

    #[test]
    fn blob_store_trait_uses_default_codec() {
        let (_dir, store) = open_temp();
        let dynamic: &dyn BlobStore = &store;
        dynamic.write("t", b"trait payload").unwrap();
        assert!(dynamic.exists("t").unwrap());
        assert_eq!(dynamic.read("t").unwrap().unwrap(), b"trait payload");
        assert_eq!(dynamic.keys().unwrap(), vec!["t".to_string()]);
        assert_eq!(dynamic.load_all().unwrap()["t"], b"trait payload");
        assert_eq!(store.entry_info("t").unwrap().unwrap().codec, Codec::Zstd);
    }
}
