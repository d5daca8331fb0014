//! Framed binary records for the files kept under `meson-private/`.
//!
//! Each persisted file starts with an eight-byte magic tag and a
//! little-endian format version, followed by a bincode payload. Loading
//! checks both before touching the payload, so a file written by a
//! different tool or an incompatible version fails cleanly instead of
//! deserialising garbage.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("file does not look like a drydock data file")]
    BadMagic,
    #[error("data file format version is {found}, this drydock expects {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("data file is corrupted: {0}")]
    Corrupt(String),
}

pub fn encode<T: Serialize>(magic: &[u8; 8], version: u32, value: &T) -> Result<Vec<u8>, RecordError> {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(magic);
    bytes.extend_from_slice(&version.to_le_bytes());
    let payload = bincode::serialize(value).map_err(|e| RecordError::Corrupt(e.to_string()))?;
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode<T: DeserializeOwned>(
    magic: &[u8; 8],
    expected_version: u32,
    bytes: &[u8],
) -> Result<T, RecordError> {
    if bytes.len() < 12 || &bytes[..8] != magic {
        return Err(RecordError::BadMagic);
    }
    let found = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if found != expected_version {
        return Err(RecordError::VersionMismatch {
            found,
            expected: expected_version,
        });
    }
    bincode::deserialize(&bytes[12..]).map_err(|e| RecordError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: &[u8; 8] = b"DRYTEST\0";

    #[test]
    fn test_round_trip() {
        let value = vec!["a".to_string(), "b".to_string()];
        let bytes = encode(MAGIC, 3, &value).unwrap();
        let back: Vec<String> = decode(MAGIC, 3, &bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn test_version_mismatch() {
        let bytes = encode(MAGIC, 3, &1u32).unwrap();
        let err = decode::<u32>(MAGIC, 4, &bytes).unwrap_err();
        assert!(matches!(
            err,
            RecordError::VersionMismatch {
                found: 3,
                expected: 4
            }
        ));
    }

    #[test]
    fn test_bad_magic() {
        let err = decode::<u32>(MAGIC, 1, b"junkfile....").unwrap_err();
        assert!(matches!(err, RecordError::BadMagic));
    }
}
