use blobcache_codec::CodecError;

/// Coarse classification of a [`StoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Open/read/write/seek failure on the backing storage.
    Io,
    /// Malformed compressed payload or archive entry header.
    CorruptData,
    /// Unrecognized compression tag.
    UnsupportedCodec,
    /// The caller passed a key or configuration the store cannot use.
    InvalidInput,
}

/// Errors from blob store operations.
///
/// A missing key is never an error: lookups return `Ok(None)` or `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the SQLite engine.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored payload or archive entry could not be decoded.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The codec tag is not one the store understands.
    #[error("unsupported codec: {0:?}")]
    UnsupportedCodec(String),

    /// The key cannot be represented in the backing format.
    #[error("invalid key {0:?}")]
    InvalidKey(String),

    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Io(_) | StoreError::Database(_) => ErrorKind::Io,
            StoreError::CorruptData(_) => ErrorKind::CorruptData,
            StoreError::UnsupportedCodec(_) => ErrorKind::UnsupportedCodec,
            StoreError::InvalidKey(_) | StoreError::Config(_) => ErrorKind::InvalidInput,
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Unsupported(tag) => StoreError::UnsupportedCodec(tag),
            CodecError::Corrupt { .. } => StoreError::CorruptData(err.to_string()),
            CodecError::Compression { .. } => {
                StoreError::Io(std::io::Error::other(err.to_string()))
            }
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
