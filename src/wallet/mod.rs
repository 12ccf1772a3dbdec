//! Wallet management
//!
//! Keystore lifecycle, account keys and transaction submission.

pub mod wallet;

pub use wallet::{ChainClient, ChainState, Wallet, WalletConfig, WalletError};
