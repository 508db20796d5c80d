//! WAL record encoding and decoding
//!
//! Each record is framed with a CRC32 checksum for corruption detection.
//!
//! ## Record Format
//!
//! ```text
//! [length: u32][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: size of payload + crc (NOT including length itself)
//! - **payload**: MessagePack-serialized record (named fields)
//! - **crc32**: CRC32 checksum over the payload
//!
//! Records are generic: the storage layer decides what a committed write set
//! looks like, this layer only frames and verifies bytes.

use crc32fast::Hasher;
use periodo_core::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

const LEN_BYTES: usize = 4;
const CRC_BYTES: usize = 4;

/// Outcome of decoding at an offset
#[derive(Debug)]
pub enum Decoded<T> {
    /// A complete, verified record and the number of bytes it occupied
    Record(T, usize),
    /// The buffer ends mid-record (torn write at the tail)
    Incomplete,
}

/// Encode a record to bytes ready for appending
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(record)
        .map_err(|e| Error::Serialization(format!("Failed to encode WAL record: {}", e)))?;

    let total_len = payload.len() + CRC_BYTES;
    let total_len = u32::try_from(total_len)
        .map_err(|_| Error::Storage(format!("WAL record too large: {} bytes", total_len)))?;

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut buf = Vec::with_capacity(LEN_BYTES + payload.len() + CRC_BYTES);
    buf.extend_from_slice(&total_len.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Decode one record from the start of `buf` with CRC validation
///
/// `offset` is the file position of `buf[0]`, used in error messages.
///
/// # Errors
///
/// Returns `Error::Corruption` when the declared length is impossible, the
/// CRC does not match, or the payload does not deserialize.
pub fn decode_record<T: DeserializeOwned>(buf: &[u8], offset: u64) -> Result<Decoded<T>> {
    if buf.len() < LEN_BYTES {
        return Ok(Decoded::Incomplete);
    }
    let mut len_buf = [0u8; LEN_BYTES];
    len_buf.copy_from_slice(&buf[..LEN_BYTES]);
    let total_len = u32::from_le_bytes(len_buf) as usize;

    if total_len <= CRC_BYTES {
        return Err(Error::Corruption(format!(
            "offset {}: Invalid record length {} (minimum is {} bytes)",
            offset,
            total_len,
            CRC_BYTES + 1
        )));
    }
    if buf.len() < LEN_BYTES + total_len {
        return Ok(Decoded::Incomplete);
    }

    let payload = &buf[LEN_BYTES..LEN_BYTES + total_len - CRC_BYTES];
    let mut crc_buf = [0u8; CRC_BYTES];
    crc_buf.copy_from_slice(&buf[LEN_BYTES + total_len - CRC_BYTES..LEN_BYTES + total_len]);
    let expected_crc = u32::from_le_bytes(crc_buf);

    let mut hasher = Hasher::new();
    hasher.update(payload);
    let actual_crc = hasher.finalize();
    if actual_crc != expected_crc {
        return Err(Error::Corruption(format!(
            "offset {}: CRC mismatch: expected {:08x}, got {:08x}",
            offset, expected_crc, actual_crc
        )));
    }

    let record = rmp_serde::from_slice(payload).map_err(|e| {
        Error::Corruption(format!("offset {}: Deserialization failed: {}", offset, e))
    })?;
    Ok(Decoded::Record(record, LEN_BYTES + total_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        generation: u64,
        names: Vec<String>,
    }

    fn sample() -> Sample {
        Sample {
            generation: 7,
            names: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let encoded = encode_record(&sample()).unwrap();
        match decode_record::<Sample>(&encoded, 0).unwrap() {
            Decoded::Record(decoded, consumed) => {
                assert_eq!(decoded, sample());
                assert_eq!(consumed, encoded.len());
            }
            Decoded::Incomplete => panic!("expected a record"),
        }
    }

    #[test]
    fn test_truncated_buffer_is_incomplete() {
        let encoded = encode_record(&sample()).unwrap();
        for cut in [0, 2, 4, encoded.len() - 1] {
            assert!(matches!(
                decode_record::<Sample>(&encoded[..cut], 0).unwrap(),
                Decoded::Incomplete
            ));
        }
    }

    #[test]
    fn test_flipped_bit_is_corruption() {
        let mut encoded = encode_record(&sample()).unwrap();
        encoded[6] ^= 0x01;
        let err = decode_record::<Sample>(&encoded, 128).unwrap_err();
        match err {
            Error::Corruption(msg) => {
                assert!(msg.contains("offset 128"));
                assert!(msg.contains("CRC mismatch"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_impossible_length_is_corruption() {
        let buf = [2u8, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode_record::<Sample>(&buf, 0),
            Err(Error::Corruption(_))
        ));
    }
}
