//! Cryptographic primitives for the wallet
//!
//! This module provides:
//! - SHA-256 and HMAC-SHA512
//! - secp256k1 keys and recoverable ECDSA signatures
//! - Hierarchical key derivation from mnemonic seeds

pub mod bip32;
pub mod hash;
pub mod keys;

pub use bip32::{
    derive, derive_master_key, private_key_from_mnemonic, DerivationError, ExtendedKey,
    COS_DERIVATION_PATH, HARDENED_OFFSET,
};
pub use hash::{double_sha256, hmac_sha512, sha256, sha256_hex};
pub use keys::{
    generate_private_key, public_key_of, recover_from_message, recover_public_key, sign_digest,
    sign_message, verify_digest, verify_message, KeyError, PrivateKey, PublicKey, Signature,
};
