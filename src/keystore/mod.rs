//! Encrypted key storage
//!
//! This module provides:
//! - The password-protected account keystore
//! - The Argon2id / ChaCha20-Poly1305 file envelope

pub mod cipher;
pub mod keystore;

pub use cipher::{KdfParams, ENVELOPE_VERSION, MAX_ITERATIONS, MAX_MEMORY_KIB, MAX_PARALLELISM};
pub use keystore::{Keystore, KeystoreConfig, KeystoreError};
