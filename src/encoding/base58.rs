//! Base58 and Base58Check encoding
//!
//! Base58Check appends a 4-byte double SHA-256 checksum to the payload
//! before encoding. The checksum input is chosen by the caller, since WIF
//! private keys checksum the key bytes but not their type byte.

use thiserror::Error;

use crate::crypto::hash::{checksum, CHECKSUM_LEN};

/// Base58 decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    #[error("Invalid base58 string: {0}")]
    InvalidCharacter(String),
    #[error("Payload too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },
    #[error("Checksum mismatch")]
    Checksum,
}

/// Encode raw bytes as Base58 text
pub fn encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decode Base58 text into raw bytes
pub fn decode(text: &str) -> Result<Vec<u8>, Base58Error> {
    bs58::decode(text)
        .into_vec()
        .map_err(|e| Base58Error::InvalidCharacter(e.to_string()))
}

/// Encode `prefix ‖ data ‖ checksum(data)` as Base58
pub fn encode_check(prefix: &[u8], data: &[u8]) -> String {
    let mut buf = Vec::with_capacity(prefix.len() + data.len() + CHECKSUM_LEN);
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(data);
    buf.extend_from_slice(&checksum(data));
    encode(&buf)
}

/// Split a decoded Base58Check buffer into its body and checksum.
///
/// Fails if the buffer holds fewer than `min_len` bytes.
pub fn split_checksum(buf: &[u8], min_len: usize) -> Result<(&[u8], &[u8]), Base58Error> {
    if buf.len() < min_len.max(CHECKSUM_LEN) {
        return Err(Base58Error::TooShort {
            len: buf.len(),
            min: min_len.max(CHECKSUM_LEN),
        });
    }
    Ok(buf.split_at(buf.len() - CHECKSUM_LEN))
}

/// Check that `expected` is the checksum of `data`
pub fn verify_checksum(data: &[u8], expected: &[u8]) -> Result<(), Base58Error> {
    if checksum(data)[..] == *expected {
        Ok(())
    } else {
        Err(Base58Error::Checksum)
    }
}

/// Decode Base58Check text whose checksum covers the whole body
pub fn decode_check(text: &str) -> Result<Vec<u8>, Base58Error> {
    let buf = decode(text)?;
    let (body, sum) = split_checksum(&buf, CHECKSUM_LEN)?;
    verify_checksum(body, sum)?;
    Ok(body.to_vec())
}
