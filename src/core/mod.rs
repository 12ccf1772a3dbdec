//! Core chain data
//!
//! This module contains:
//! - Transactions (opaque operations, TAPOS reference, chain-bound signatures)

pub mod transaction;

pub use transaction::{
    tapos, Operation, SignedTransaction, Transaction, TransactionBuilder, TransactionError,
    DEFAULT_EXPIRATION_SECS, REF_BLOCK_WINDOW,
};
