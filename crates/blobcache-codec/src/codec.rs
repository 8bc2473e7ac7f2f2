use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Payloads shorter than this are zstd-compressed as one-shot frames, which
/// record the content size and use single-segment mode.
pub const ZSTD_SINGLE_SEGMENT_LIMIT: usize = 256;

/// Reversible transform applied to a payload before it is stored.
///
/// The tag returned by [`Codec::tag`] is persisted next to the packed bytes,
/// so [`Codec::unpack`] never needs an external hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Identity transform.
    #[default]
    None,
    /// zlib-framed deflate stream.
    Deflate,
    /// Zstandard at the maximum compression level.
    Zstd,
}

impl Codec {
    /// Every known codec, in tag order.
    pub const ALL: [Codec; 3] = [Codec::None, Codec::Deflate, Codec::Zstd];

    /// Tag persisted alongside packed data. The identity codec is stored as
    /// an empty string.
    pub fn tag(self) -> &'static str {
        match self {
            Codec::None => "",
            Codec::Deflate => "deflate",
            Codec::Zstd => "zstd",
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Deflate => "deflate",
            Codec::Zstd => "zstd",
        }
    }

    /// Decode a persisted tag.
    pub fn from_tag(tag: &str) -> CodecResult<Self> {
        match tag {
            "" | "none" => Ok(Codec::None),
            // "zlib" is the tag older stores used for the same stream format.
            "deflate" | "zlib" => Ok(Codec::Deflate),
            "zstd" => Ok(Codec::Zstd),
            other => Err(CodecError::Unsupported(other.to_string())),
        }
    }

    /// Returns `true` for codecs that actually change the bytes.
    pub fn is_compressing(self) -> bool {
        !matches!(self, Codec::None)
    }

    /// Apply the forward transform.
    pub fn pack(self, data: &[u8]) -> CodecResult<Vec<u8>> {
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::Deflate => deflate_pack(data),
            Codec::Zstd => zstd_pack(data),
        }
    }

    /// Apply the inverse transform.
    pub fn unpack(self, data: &[u8]) -> CodecResult<Vec<u8>> {
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::Deflate => deflate_unpack(data),
            Codec::Zstd => zstd_unpack(data),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Codec::from_tag(s)
    }
}

fn deflate_pack(data: &[u8]) -> CodecResult<Vec<u8>> {
    let fail = |e: std::io::Error| CodecError::Compression {
        codec: "deflate",
        reason: e.to_string(),
    };
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(fail)?;
    encoder.finish().map_err(fail)
}

fn deflate_unpack(data: &[u8]) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Corrupt {
            codec: "deflate",
            reason: e.to_string(),
        })?;
    Ok(out)
}

fn zstd_level() -> i32 {
    *zstd::compression_level_range().end()
}

fn zstd_pack(data: &[u8]) -> CodecResult<Vec<u8>> {
    let packed = if data.len() < ZSTD_SINGLE_SEGMENT_LIMIT {
        zstd::bulk::compress(data, zstd_level())
    } else {
        zstd::stream::encode_all(data, zstd_level())
    };
    packed.map_err(|e| CodecError::Compression {
        codec: "zstd",
        reason: e.to_string(),
    })
}

fn zstd_unpack(data: &[u8]) -> CodecResult<Vec<u8>> {
    zstd::stream::decode_all(data).map_err(|e| CodecError::Corrupt {
        codec: "zstd",
        reason: e.to_string(),
    })
}
