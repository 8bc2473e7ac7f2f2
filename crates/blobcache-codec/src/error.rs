use thiserror::Error;

/// Errors produced by codec operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The codec tag is not one of the known variants.
    #[error("unsupported codec: {0:?}")]
    Unsupported(String),

    /// The packed stream does not match the codec's framing.
    #[error("corrupt {codec} stream: {reason}")]
    Corrupt { codec: &'static str, reason: String },

    /// The encoder itself failed.
    #[error("{codec} compression failed: {reason}")]
    Compression { codec: &'static str, reason: String },
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
