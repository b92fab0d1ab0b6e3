use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheError;

/// Serialized payloads longer than this many bytes are stored gzip-compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Physical representation chosen for a serialized value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Encoded {
    Plain(Vec<u8>),
    Compressed(Vec<u8>),
}

pub(crate) fn encode<T: Serialize>(value: &T, threshold: usize) -> Result<Encoded, CacheError> {
    let serialized =
        serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

    if serialized.len() <= threshold {
        return Ok(Encoded::Plain(serialized));
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(serialized.len() / 2), Compression::default());
    encoder
        .write_all(&serialized)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CacheError::Compression(e.to_string()))?;

    Ok(Encoded::Compressed(compressed))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], compressed: bool) -> Result<T, CacheError> {
    if !compressed {
        return serde_json::from_slice(bytes).map_err(|e| CacheError::Decode(e.to_string()));
    }

    let mut decoder = GzDecoder::new(bytes);
    let mut inflated = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut inflated)
        .map_err(|e| CacheError::Decompression(e.to_string()))?;

    serde_json::from_slice(&inflated).map_err(|e| CacheError::Decode(e.to_string()))
}
