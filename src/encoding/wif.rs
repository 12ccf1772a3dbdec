//! Wallet Import Format
//!
//! Private keys: `Base58(0x01 ‖ key ‖ checksum(key))`.
//! Public keys: `"COS" ‖ Base58(key ‖ checksum(key))`.

use thiserror::Error;

use super::base58::{self, Base58Error};
use crate::crypto::keys::{KeyError, PrivateKey, PublicKey};

/// Literal prefix of WIF public keys, applied outside the Base58 text
pub const PUBLIC_KEY_PREFIX: &str = "COS";

/// Type byte leading every WIF private key payload
pub const PRIVATE_KEY_VERSION: u8 = 0x01;

const PRIVATE_MIN_LEN: usize = 5;
const PUBLIC_MIN_LEN: usize = 4;

/// WIF decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WifError {
    #[error("Malformed WIF string: {0}")]
    Format(String),
    #[error("WIF checksum mismatch")]
    Checksum,
    #[error("Invalid key: {0}")]
    Key(#[from] KeyError),
}

impl From<Base58Error> for WifError {
    fn from(err: Base58Error) -> Self {
        match err {
            Base58Error::Checksum => WifError::Checksum,
            other => WifError::Format(other.to_string()),
        }
    }
}

/// Encode raw key bytes
pub fn encode(bytes: &[u8], is_private: bool) -> String {
    if is_private {
        base58::encode_check(&[PRIVATE_KEY_VERSION], bytes)
    } else {
        format!("{}{}", PUBLIC_KEY_PREFIX, base58::encode_check(&[], bytes))
    }
}

/// Decode WIF text back to raw key bytes
pub fn decode(text: &str, is_private: bool) -> Result<Vec<u8>, WifError> {
    let body = if is_private {
        text
    } else {
        text.strip_prefix(PUBLIC_KEY_PREFIX).ok_or_else(|| {
            WifError::Format(format!("missing {} prefix", PUBLIC_KEY_PREFIX))
        })?
    };

    let raw = base58::decode(body)?;
    let min_len = if is_private {
        PRIVATE_MIN_LEN
    } else {
        PUBLIC_MIN_LEN
    };
    let (payload, sum) = base58::split_checksum(&raw, min_len)?;

    let key = if is_private {
        if payload[0] != PRIVATE_KEY_VERSION {
            return Err(WifError::Format(format!(
                "unexpected type byte {:#04x}",
                payload[0]
            )));
        }
        &payload[1..]
    } else {
        payload
    };

    base58::verify_checksum(key, sum)?;
    Ok(key.to_vec())
}

/// Encode a private key as WIF
pub fn private_key_to_wif(key: &PrivateKey) -> String {
    encode(&key.to_bytes(), true)
}

/// Decode a WIF private key, checking the scalar range
pub fn private_key_from_wif(text: &str) -> Result<PrivateKey, WifError> {
    let bytes = decode(text, true)?;
    Ok(PrivateKey::from_bytes(&bytes)?)
}

/// Encode a public key as `COS…` WIF
pub fn public_key_to_wif(key: &PublicKey) -> String {
    encode(&key.to_bytes(), false)
}

/// Decode a `COS…` WIF public key
pub fn public_key_from_wif(text: &str) -> Result<PublicKey, WifError> {
    let bytes = decode(text, false)?;
    Ok(PublicKey::from_bytes(&bytes)?)
}
