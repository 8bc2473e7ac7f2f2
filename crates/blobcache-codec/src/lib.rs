//! Pack/unpack codecs for blobcache payloads.
//!
//! A [`Codec`] is a small closed enumeration of reversible transforms. Its
//! tag is stored next to the packed bytes, so readers always know how to
//! unpack a payload without any external hint.
//!
//! | codec     | tag         | transform                                  |
//! |-----------|-------------|--------------------------------------------|
//! | `none`    | `""`        | identity                                   |
//! | `deflate` | `"deflate"` | zlib-framed deflate, default level         |
//! | `zstd`    | `"zstd"`    | Zstandard, maximum level                   |
//!
//! Unknown tags are rejected with [`CodecError::Unsupported`]; streams that
//! do not match their codec's framing fail with [`CodecError::Corrupt`].

pub mod codec;
pub mod error;

pub use codec::{Codec, ZSTD_SINGLE_SEGMENT_LIMIT};
pub use error::{CodecError, CodecResult};
