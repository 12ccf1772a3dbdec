//! Text encodings for keys
//!
//! This module provides:
//! - Base58 / Base58Check
//! - WIF private and public key strings

pub mod base58;
pub mod wif;

pub use base58::Base58Error;
pub use wif::{
    private_key_from_wif, private_key_to_wif, public_key_from_wif, public_key_to_wif, WifError,
    PUBLIC_KEY_PREFIX,
};
