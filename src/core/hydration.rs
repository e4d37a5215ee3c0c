//! Hydration / Compression Interface (C5, §4.5).
//!
//! The core consumes opaque codebase/docbase blobs; this module is the
//! "external helper" contract: `encode`/`decode` plus the entry shape
//! (`p`, `c`, `l`, `s`) and MD5 integrity hashing for staged files. Grounded
//! on the `gz:`-prefixed base64+gzip convention in the original payload
//! builder's `_decompress_content`.

use crate::core::error::CoreError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

const GZ_PREFIX: &str = "gz:";

/// One entry in a codebase/docbase blob's `files` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Project-relative path.
    pub p: String,
    /// Encoded content: `gz:`-prefixed base64 gzip, or literal UTF-8.
    pub c: String,
    /// Language tag.
    pub l: String,
    /// Size in bytes of the decoded content.
    pub s: u64,
}

/// A codebase or docbase blob: a JSON document with a `files` array (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Blob {
    pub files: Vec<BlobEntry>,
}

impl Blob {
    pub fn find(&self, path: &str) -> Option<&BlobEntry> {
        self.files.iter().find(|f| f.p == path)
    }
}

/// `encode(bytes, language) → entry`: gzip+base64 the bytes with the `gz:`
/// prefix, recording language and decoded size.
pub fn encode(bytes: &[u8], path: &str, language: &str) -> Result<BlobEntry, CoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| CoreError::io(path, e))?;
    let compressed = encoder.finish().map_err(|e| CoreError::io(path, e))?;
    let encoded = format!("{}{}", GZ_PREFIX, BASE64.encode(&compressed));
    Ok(BlobEntry {
        p: path.to_string(),
        c: encoded,
        l: language.to_string(),
        s: bytes.len() as u64,
    })
}

/// `decode(entry) → bytes`: reverse of `encode`. Content without the `gz:`
/// prefix is literal UTF-8 and is returned as-is.
pub fn decode(entry: &BlobEntry) -> Result<Vec<u8>, CoreError> {
    decode_content(&entry.c)
}

/// Decode a raw content string per the `gz:` convention, independent of a
/// full `BlobEntry` (used when only the encoded field is at hand).
pub fn decode_content(content: &str) -> Result<Vec<u8>, CoreError> {
    if let Some(b64) = content.strip_prefix(GZ_PREFIX) {
        let compressed = BASE64
            .decode(b64)
            .map_err(|e| CoreError::InvalidState(format!("bad base64: {}", e)))?;
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CoreError::io("<gzip>", e))?;
        Ok(out)
    } else {
        Ok(content.as_bytes().to_vec())
    }
}

/// MD5 of decoded bytes, for staged-file integrity checks (§4.5, §4.11).
/// This is an integrity checksum, not a security boundary; the wire
/// protocol carries an independent SHA-256 checksum (§9 Open Question 1).
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let original = b"fn main() { println!(\"hi\"); }".to_vec();
        let entry = encode(&original, "src/main.rs", "rust").unwrap();
        assert!(entry.c.starts_with("gz:"));
        let decoded = decode(&entry).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_literal_content_passes_through() {
        let literal = "plain text, no prefix".to_string();
        let decoded = decode_content(&literal).unwrap();
        assert_eq!(decoded, literal.as_bytes());
    }

    #[test]
    fn test_md5_hex_known_value() {
        // md5("") is the well-known empty-input digest.
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
