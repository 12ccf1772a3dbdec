//! Transaction building and signing
//!
//! A transaction is an ordered list of opaque, pre-serialized operations plus
//! TAPOS reference fields and an expiration time. Signing binds the body to a
//! chain id so a signature for one chain never verifies on another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::crypto::hash::{sha256, sha256_hex};
use crate::crypto::keys::{KeyError, PrivateKey, PublicKey, Signature, SIGNATURE_SIZE};
use crate::encoding::wif::{private_key_from_wif, WifError};

// =============================================================================
// Constants
// =============================================================================

/// Seconds added to the head block time by [`TransactionBuilder::set_from_chain_state`]
pub const DEFAULT_EXPIRATION_SECS: u32 = 30;

/// `ref_block_num` is the head height modulo this window
pub const REF_BLOCK_WINDOW: u64 = 2048;

/// Block ids shorter than this yield zeroed TAPOS fields
pub const MIN_BLOCK_ID_LEN: usize = 12;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(#[from] WifError),
    #[error("Signature error: {0}")]
    Signature(#[from] KeyError),
    #[error("{field} length {len} does not fit a u32 prefix")]
    TooLarge { field: &'static str, len: usize },
}

// =============================================================================
// Operation
// =============================================================================

/// A pre-serialized operation. Its contents are opaque to the signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(#[serde(with = "hex_bytes")] Vec<u8>);

impl Operation {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Operation {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Operation {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// TAPOS
// =============================================================================

/// Derive `(ref_block_num, ref_block_prefix)` from a head block id.
///
/// Bytes `0..8` are the block height (little-endian), reduced modulo
/// [`REF_BLOCK_WINDOW`]. Bytes `8..12` are the prefix (big-endian). Ids shorter
/// than 12 bytes give `(0, 0)`.
pub fn tapos(head_block_id: &[u8]) -> (u32, u32) {
    if head_block_id.len() < MIN_BLOCK_ID_LEN {
        return (0, 0);
    }

    let mut height = [0u8; 8];
    height.copy_from_slice(&head_block_id[..8]);
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&head_block_id[8..12]);

    let ref_block_num = (u64::from_le_bytes(height) % REF_BLOCK_WINDOW) as u32;
    (ref_block_num, u32::from_be_bytes(prefix))
}

// =============================================================================
// Transaction
// =============================================================================

/// An unsigned transaction body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub ref_block_num: u32,
    pub ref_block_prefix: u32,
    /// Expiration as UTC seconds
    pub expiration: u32,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Deterministic body encoding, all integers big-endian:
    /// `ref_block_num ‖ ref_block_prefix ‖ expiration ‖ op_count ‖ (op_len ‖ op)*`
    pub fn serialize_body(&self) -> Result<Vec<u8>, TransactionError> {
        let ops_len: usize = self.operations.iter().map(|op| 4 + op.len()).sum();
        let mut body = Vec::with_capacity(16 + ops_len);

        body.extend_from_slice(&self.ref_block_num.to_be_bytes());
        body.extend_from_slice(&self.ref_block_prefix.to_be_bytes());
        body.extend_from_slice(&self.expiration.to_be_bytes());
        body.extend_from_slice(&length_prefix("operation count", self.operations.len())?);
        for op in &self.operations {
            body.extend_from_slice(&length_prefix("operation", op.len())?);
            body.extend_from_slice(op.as_bytes());
        }
        Ok(body)
    }

    /// `SHA-256(chain_id ‖ body)` with the chain id as 4 big-endian bytes
    pub fn signing_digest(&self, chain_id: i32) -> Result<[u8; 32], TransactionError> {
        Ok(signing_digest(chain_id, &self.serialize_body()?))
    }

    /// Hex SHA-256 of the body
    pub fn id(&self) -> Result<String, TransactionError> {
        Ok(sha256_hex(&self.serialize_body()?))
    }

    /// Expiration as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.expiration), 0)
    }

    /// Whether the transaction has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > i64::from(self.expiration)
    }

    /// Sign for `chain_id` with `private_key`
    pub fn sign(
        self,
        private_key: &PrivateKey,
        chain_id: i32,
    ) -> Result<SignedTransaction, TransactionError> {
        let body = self.serialize_body()?;
        let signature = private_key.sign_digest(&signing_digest(chain_id, &body));
        Ok(SignedTransaction {
            transaction: self,
            signature,
            body,
        })
    }
}

fn length_prefix(field: &'static str, len: usize) -> Result<[u8; 4], TransactionError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| TransactionError::TooLarge { field, len })
}

fn signing_digest(chain_id: i32, body: &[u8]) -> [u8; 32] {
    let mut payload = Vec::with_capacity(4 + body.len());
    payload.extend_from_slice(&chain_id.to_be_bytes());
    payload.extend_from_slice(body);
    sha256(&payload)
}

// =============================================================================
// Signed Transaction
// =============================================================================

/// A transaction body together with its signature. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignedParts", into = "SignedParts")]
pub struct SignedTransaction {
    transaction: Transaction,
    signature: Signature,
    body: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SignedParts {
    transaction: Transaction,
    signature: Signature,
}

impl From<SignedTransaction> for SignedParts {
    fn from(signed: SignedTransaction) -> Self {
        Self {
            transaction: signed.transaction,
            signature: signed.signature,
        }
    }
}

impl TryFrom<SignedParts> for SignedTransaction {
    type Error = TransactionError;

    fn try_from(parts: SignedParts) -> Result<Self, TransactionError> {
        let body = parts.transaction.serialize_body()?;
        Ok(Self {
            transaction: parts.transaction,
            signature: parts.signature,
            body,
        })
    }
}

impl SignedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Serialized body the signature covers
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Hex SHA-256 of the body
    pub fn id(&self) -> String {
        sha256_hex(&self.body)
    }

    /// Check the signature against `public_key` under `chain_id`
    pub fn verify(&self, chain_id: i32, public_key: &PublicKey) -> bool {
        self.signature
            .verify_digest(&signing_digest(chain_id, &self.body), public_key)
    }

    /// Public key that produced the signature, assuming `chain_id`
    pub fn recover_signer(&self, chain_id: i32) -> Result<PublicKey, TransactionError> {
        Ok(self
            .signature
            .recover_digest(&signing_digest(chain_id, &self.body))?)
    }

    /// Wire encoding: `body ‖ signature`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.body.len() + SIGNATURE_SIZE);
        bytes.extend_from_slice(&self.body);
        bytes.extend_from_slice(self.signature.as_bytes());
        bytes
    }

    pub fn into_parts(self) -> (Transaction, Signature) {
        (self.transaction, self.signature)
    }
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for creating transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    transaction: Transaction,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation; order is preserved
    pub fn add_operation(mut self, operation: impl Into<Operation>) -> Self {
        self.transaction.operations.push(operation.into());
        self
    }

    /// Set the expiration (UTC seconds)
    pub fn set_expiration(mut self, expiration: u32) -> Self {
        self.transaction.expiration = expiration;
        self
    }

    /// Set the expiration from a timestamp, clamped to the `u32` seconds range
    pub fn set_expiration_time(self, expiration: DateTime<Utc>) -> Self {
        let secs = expiration.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        self.set_expiration(secs)
    }

    /// Set the TAPOS fields from the head block id
    pub fn set_reference_block(mut self, head_block_id: &[u8]) -> Self {
        let (ref_block_num, ref_block_prefix) = tapos(head_block_id);
        self.transaction.ref_block_num = ref_block_num;
        self.transaction.ref_block_prefix = ref_block_prefix;
        self
    }

    /// Reference the head block and expire [`DEFAULT_EXPIRATION_SECS`] after its time
    pub fn set_from_chain_state(self, head_block_id: &[u8], head_block_time: u32) -> Self {
        self.set_reference_block(head_block_id)
            .set_expiration(head_block_time.saturating_add(DEFAULT_EXPIRATION_SECS))
    }

    pub fn operations(&self) -> &[Operation] {
        &self.transaction.operations
    }

    /// Build without signing
    pub fn build(self) -> Transaction {
        self.transaction
    }

    /// Sign with a WIF private key for `chain_id`
    pub fn sign(self, wif: &str, chain_id: i32) -> Result<SignedTransaction, TransactionError> {
        let private_key = private_key_from_wif(wif)?;
        self.sign_with_key(&private_key, chain_id)
    }

    /// Sign with an already decoded key for `chain_id`
    pub fn sign_with_key(
        self,
        private_key: &PrivateKey,
        chain_id: i32,
    ) -> Result<SignedTransaction, TransactionError> {
        self.build().sign(private_key, chain_id)
    }
}

// =============================================================================
// Tests
// =============================================================================
