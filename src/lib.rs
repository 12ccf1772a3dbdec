//! COS wallet core: keys, signatures and transaction signing for the COS chain
//!
//! This crate provides:
//! - secp256k1 keys with recoverable, low-S ECDSA signatures
//! - Mnemonic-based key derivation along `m/44'/3077'/0'/0/0`
//! - WIF encoding for private keys and `COS`-prefixed public keys
//! - A password-encrypted keystore of account keys
//! - Transaction building with TAPOS reference fields and chain-bound signatures
//!
//! # Example
//!
//! ```rust
//! use cos_wallet_core::core::TransactionBuilder;
//! use cos_wallet_core::crypto::generate_private_key;
//! use cos_wallet_core::encoding::{private_key_to_wif, public_key_to_wif};
//!
//! // Create a key and export it
//! let key = generate_private_key();
//! let wif = private_key_to_wif(&key);
//! println!("Public key: {}", public_key_to_wif(&key.public_key()));
//!
//! // Sign a transaction against a head block
//! let head_block_id = [7u8; 32];
//! let signed = TransactionBuilder::new()
//!     .set_from_chain_state(&head_block_id, 1_600_000_000)
//!     .add_operation(vec![0x01u8, 0x02])
//!     .sign(&wif, 1)
//!     .unwrap();
//!
//! assert!(signed.verify(1, &key.public_key()));
//! println!("Transaction {}", signed.id());
//! ```

pub mod core;
pub mod crypto;
pub mod encoding;
pub mod keystore;
pub mod wallet;

// Re-export commonly used types
pub use self::core::{Operation, SignedTransaction, Transaction, TransactionBuilder};
pub use crypto::{PrivateKey, PublicKey, Signature};
pub use encoding::{private_key_from_wif, private_key_to_wif, public_key_from_wif, public_key_to_wif};
pub use keystore::{KdfParams, Keystore, KeystoreConfig};
pub use wallet::{ChainClient, ChainState, Wallet, WalletConfig};
