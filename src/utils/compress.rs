// Gzip helpers for snapshot files
// Author: kelexine (https://github.com/kelexine)

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::Result;

/// Magic bytes at the start of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether `data` starts like a gzip stream.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

/// Gzip-compress a byte slice.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress gzip input; anything else passes through unchanged, since
/// snapshot files are accepted both compressed and plain.
pub fn maybe_decompress(data: Vec<u8>) -> Result<Vec<u8>> {
    if !is_gzip(&data) {
        return Ok(data);
    }

    let mut decoder = GzDecoder::new(&data[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let original = br#"{"entries":{},"stats":{}}"#;
        let compressed = compress(original).unwrap();
        assert!(is_gzip(&compressed));
        assert_eq!(maybe_decompress(compressed).unwrap(), original);
    }

    #[test]
    fn test_plain_data_passes_through() {
        let plain = b"just a json document".to_vec();
        assert!(!is_gzip(&plain));
        assert_eq!(maybe_decompress(plain.clone()).unwrap(), plain);
    }
}
