use std::collections::{BTreeSet, HashMap};
use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, info, warn};

use crate::config::ArchiveConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

/// Tar block size. Headers, padded content and the end-of-archive marker are
/// all whole blocks.
pub const BLOCK_SIZE: u64 = 512;

/// What follows the last entry of a container.
///
/// A well-formed tar stream ends with two all-zero blocks, and the `tar`
/// tool pads further up to a whole record. Writers that stop early may
/// leave one zero block or none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trailer {
    /// No end-of-archive padding; the file ends with the last entry.
    Open,
    /// A single zero block.
    OneBlock,
    /// Two or more zero blocks.
    Terminated,
}

impl Trailer {
    /// Classify the bytes between the end of the last entry and the end of
    /// the file. Returns `None` if they are not whole zero blocks.
    pub fn classify(padding: &[u8]) -> Option<Self> {
        if padding.len() as u64 % BLOCK_SIZE != 0 || padding.iter().any(|&b| b != 0) {
            return None;
        }
        Some(match padding.len() as u64 / BLOCK_SIZE {
            0 => Trailer::Open,
            1 => Trailer::OneBlock,
            _ => Trailer::Terminated,
        })
    }
}

/// Header fields of one physical entry in the container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryMeta {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    /// Modification time, seconds since the unix epoch.
    pub mtime: u64,
    /// Byte offset of the entry's header block.
    pub offset: u64,
}

/// Append-only blob store kept in a plain tar file.
///
/// Writes never modify earlier entries: a second `put` under the same key
/// adds another entry, and readers decide which one counts (last wins for
/// whole-store reads, `get_bytes(key, true)` returns the first). The file
/// stays readable by ordinary tar tools after every append.
///
/// Scans and appends share one file cursor, so a single mutex serializes
/// every operation, reads included.
pub struct ArchiveStore {
    path: PathBuf,
    config: ArchiveConfig,
    container: Mutex<Container>,
}

struct Container {
    file: File,
    /// Offset just past the last entry, as left by our latest append.
    end: Option<u64>,
}

impl ArchiveStore {
    /// Open the container at `path`, creating an empty file if needed.
    pub fn open(path: impl AsRef<Path>, config: ArchiveConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "opening archive blob store");

        if !path.exists() {
            File::create(&path)?;
        }
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Ok(Self {
            path,
            config,
            container: Mutex::new(Container { file, end: None }),
        })
    }

    /// Release the file handle.
    pub fn close(self) {
        debug!(path = %self.path.display(), "closing archive blob store");
        drop(self.container.into_inner().unwrap_or_else(PoisonError::into_inner));
    }

    /// Path of the backing tar file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the contents of a file under its base name. The entry keeps the
    /// file's size, permission bits and modification time. Returns the key.
    pub fn put_file(&self, path: impl AsRef<Path>) -> StoreResult<String> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?
            .to_string();

        let file = File::open(path)?;
        let meta = file.metadata()?;
        let mut header = entry_header(
            meta.len(),
            file_mode(&meta, self.config.file_mode),
            modified_secs(&meta),
        );
        let source = ExactReader {
            inner: file,
            remaining: meta.len(),
        };
        self.append(&mut header, &name, source)?;
        Ok(name)
    }

    /// Append `payload` as a new entry named `key`.
    pub fn put_bytes(&self, key: &str, payload: &[u8]) -> StoreResult<()> {
        let now = Utc::now().timestamp().max(0) as u64;
        let mut header = entry_header(payload.len() as u64, self.config.file_mode, now);
        self.append(&mut header, key, payload)?;
        Ok(())
    }

    /// Payload stored under `key`: the earliest entry when `first` is set,
    /// otherwise the latest one.
    pub fn get_bytes(&self, key: &str, first: bool) -> StoreResult<Option<Vec<u8>>> {
        let mut found = None;
        self.scan(|meta, reader| {
            if meta.name != key {
                return Ok(ControlFlow::Continue(()));
            }
            found = Some(read_payload(meta, reader)?);
            Ok(if first {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })?;
        Ok(found)
    }

    /// Returns `true` if at least one entry is named `key`.
    pub fn contains(&self, key: &str) -> StoreResult<bool> {
        let mut found = false;
        self.scan(|meta, _| {
            found = meta.name == key;
            Ok(if found {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })?;
        Ok(found)
    }

    /// Distinct entry names.
    pub fn list_files(&self) -> StoreResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        self.scan(|meta, _| {
            names.insert(meta.name.clone());
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(names)
    }

    /// Every physical entry, in append order, duplicates included.
    pub fn entries(&self) -> StoreResult<Vec<EntryMeta>> {
        let mut entries = Vec::new();
        self.scan(|meta, _| {
            entries.push(meta.clone());
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(entries)
    }

    /// Read the whole container into memory; later entries replace earlier
    /// ones with the same name.
    pub fn load_all(&self) -> StoreResult<HashMap<String, Vec<u8>>> {
        let mut all = HashMap::new();
        self.scan(|meta, reader| {
            all.insert(meta.name.clone(), read_payload(meta, reader)?);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(all)
    }

    /// Add one entry after the last one. On failure the container is cut
    /// back to where the entry would have started and terminated there.
    fn append(&self, header: &mut Header, key: &str, data: impl Read) -> StoreResult<u64> {
        validate_key(key)?;

        let mut container = self.container.lock().expect("archive lock poisoned");
        let (end, trailer) = container.logical_end()?;
        container.end = None;

        let sync = self.config.sync_on_append;
        match write_entry(&mut container.file, end, header, key, data, sync) {
            Ok(entry_end) => {
                container.end = Some(entry_end);
                debug!(key, offset = end, ?trailer, entry_end, "appended archive entry");
                Ok(end)
            }
            Err(err) => {
                if let Err(restore) = terminate_at(&mut container.file, end) {
                    warn!(
                        path = %self.path.display(),
                        offset = end,
                        error = %restore,
                        "cannot roll back failed archive append"
                    );
                }
                Err(err)
            }
        }
    }

    /// Walk the container from the start. Any malformed header aborts the
    /// whole walk.
    fn scan(
        &self,
        mut visit: impl FnMut(&EntryMeta, &mut dyn Read) -> StoreResult<ControlFlow<()>>,
    ) -> StoreResult<()> {
        let mut container = self.container.lock().expect("archive lock poisoned");
        let file = &mut container.file;
        file.seek(SeekFrom::Start(0))?;

        let mut archive = Archive::new(file);
        for entry in archive.entries().map_err(scan_error)? {
            let mut entry = entry.map_err(scan_error)?;
            let meta = entry_meta(&entry)?;
            if visit(&meta, &mut entry)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}

impl BlobStore for ArchiveStore {
    fn write(&self, key: &str, payload: &[u8]) -> StoreResult<()> {
        self.put_bytes(key, payload)
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.get_bytes(key, false)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.contains(key)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.list_files()?.into_iter().collect())
    }

    fn load_all(&self) -> StoreResult<HashMap<String, Vec<u8>>> {
        ArchiveStore::load_all(self)
    }
}

impl std::fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("path", &self.path)
            .finish()
    }
}

impl Container {
    /// Offset where the next entry must start, and what currently sits
    /// there.
    ///
    /// The end is found by walking the entry headers, since the content of
    /// an entry may itself end in zero blocks. Everything after the last
    /// entry must be zero padding.
    fn logical_end(&mut self) -> StoreResult<(u64, Trailer)> {
        let len = self.file.metadata()?.len();
        if len % BLOCK_SIZE != 0 {
            return Err(StoreError::CorruptData(format!(
                "container length {len} is not a multiple of {BLOCK_SIZE}"
            )));
        }
        if let Some(end) = self.end {
            if len == end + 2 * BLOCK_SIZE {
                return Ok((end, Trailer::Terminated));
            }
        }

        let end = entries_end(&mut self.file)?;
        if end > len {
            return Err(StoreError::CorruptData(format!(
                "last entry runs to offset {end}, past the end of the container ({len})"
            )));
        }

        let mut padding = Vec::new();
        self.file.seek(SeekFrom::Start(end))?;
        (&mut self.file).take(len - end).read_to_end(&mut padding)?;
        let trailer = Trailer::classify(&padding).ok_or_else(|| {
            StoreError::CorruptData(format!(
                "unreachable data after the last entry at offset {end}"
            ))
        })?;
        Ok((end, trailer))
    }
}

/// Offset just past the content of the last entry, or 0 for an empty
/// container.
fn entries_end(file: &mut File) -> StoreResult<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut archive = Archive::new(file);
    let mut end = 0;
    for entry in archive.entries_with_seek().map_err(scan_error)? {
        let entry = entry.map_err(scan_error)?;
        let size = entry.header().entry_size().map_err(scan_error)?;
        end = entry.raw_file_position() + size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    }
    Ok(end)
}

/// Write one entry at `offset`, followed by the end-of-archive blocks.
/// Returns the offset just past the entry.
fn write_entry(
    file: &mut File,
    offset: u64,
    header: &mut Header,
    key: &str,
    data: impl Read,
    sync: bool,
) -> StoreResult<u64> {
    file.seek(SeekFrom::Start(offset))?;
    let mut builder = Builder::new(&mut *file);
    builder.append_data(header, key, data)?;
    let entry_end = builder.get_mut().stream_position()?;
    builder.into_inner()?;

    file.set_len(entry_end + 2 * BLOCK_SIZE)?;
    if sync {
        file.sync_data()?;
    }
    Ok(entry_end)
}

/// Cut the container at `offset` and close it with two zero blocks.
fn terminate_at(file: &mut File, offset: u64) -> io::Result<()> {
    file.set_len(offset)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&[0u8; 2 * BLOCK_SIZE as usize])
}

/// Source for an entry whose header already fixes the size: yields at most
/// `remaining` bytes and fails if `inner` runs out first.
struct ExactReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended {} bytes short", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Keys become entry paths verbatim, so they must already be in the
/// normalized relative form tar stores.
fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.contains('\0')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn entry_header(size: u64, mode: u32, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(mtime);
    header
}

fn entry_meta<R: Read>(entry: &tar::Entry<'_, R>) -> StoreResult<EntryMeta> {
    let header = entry.header();
    Ok(EntryMeta {
        name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
        size: entry.size(),
        mode: header.mode().map_err(scan_error)?,
        mtime: header.mtime().map_err(scan_error)?,
        offset: entry.raw_header_position(),
    })
}

fn read_payload(meta: &EntryMeta, reader: &mut dyn Read) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(meta.size as usize);
    reader.read_to_end(&mut payload).map_err(scan_error)?;
    if payload.len() as u64 != meta.size {
        return Err(StoreError::CorruptData(format!(
            "entry {:?} at offset {} is truncated: expected {} bytes, read {}",
            meta.name,
            meta.offset,
            meta.size,
            payload.len()
        )));
    }
    Ok(payload)
}

/// Header parsing failures surface from the tar reader as generic I/O
/// errors; anything that is not a real device error means the container is
/// malformed.
fn scan_error(err: io::Error) -> StoreError {
    match err.kind() {
        io::ErrorKind::Other | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            StoreError::CorruptData(format!("malformed archive entry: {err}"))
        }
        _ => StoreError::Io(err),
    }
}

#[cfg(unix)]
fn file_mode(meta: &Metadata, _fallback: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &Metadata, fallback: u32) -> u32 {
    fallback
}

fn modified_secs(meta: &Metadata) -> u64 {
    meta.modified()
        .map(|t| DateTime::<Utc>::from(t).timestamp().max(0) as u64)
        .unwrap_or(0)
}
