//! secp256k1 key primitives
//!
//! Private key generation, public key derivation, and publicly-recoverable
//! ECDSA signatures. Signatures are serialized as `r ‖ s ‖ recovery_id`
//! (65 bytes) and are always low-S.

use std::fmt;

use crypto_bigint::{Encoding, U320};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::constants::CURVE_ORDER;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature as EcdsaSignature};
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::Zeroize;

use super::hash::sha256;

/// Width of a scalar (private key, `r`, `s`) in bytes
pub const SCALAR_SIZE: usize = 32;

/// Size of a compressed public key
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Size of a serialized recoverable signature
pub const SIGNATURE_SIZE: usize = 2 * SCALAR_SIZE + 1;

/// `N / 2`, the largest `s` a normalized signature may carry
pub const HALF_CURVE_ORDER: [u8; SCALAR_SIZE] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Errors that can occur during key operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid private key length: {0} bytes")]
    InvalidPrivateKeyLength(usize),
    #[error("Scalar out of range [1, N-1]")]
    OutOfRange,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature length: {0} bytes, expected 65")]
    InvalidSignatureLength(usize),
    #[error("Public key recovery failed: {0}")]
    Recovery(String),
}

/// A secp256k1 private key, a scalar in `[1, N-1]`
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(SecretKey);

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        let mut wide = [0u8; SCALAR_SIZE + 8];
        OsRng.fill_bytes(&mut wide);
        let mut scalar = reduce_wide(&wide);
        wide.zeroize();

        // reduce_wide only yields values in [1, N-1]
        let secret_key = SecretKey::from_slice(&scalar).expect("scalar is within curve order");
        scalar.zeroize();
        Self(secret_key)
    }

    /// Parse a big-endian 32-byte scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SCALAR_SIZE {
            return Err(KeyError::InvalidPrivateKeyLength(bytes.len()));
        }
        SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| KeyError::OutOfRange)
    }

    pub(crate) fn from_secret_key(secret_key: SecretKey) -> Self {
        Self(secret_key)
    }

    /// Big-endian scalar bytes
    /// WARNING: Keep this secret!
    pub fn to_bytes(&self) -> [u8; SCALAR_SIZE] {
        self.0.secret_bytes()
    }

    /// The compressed public key `Q = d·G`
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        PublicKey(secp256k1::PublicKey::from_secret_key(&secp, &self.0))
    }

    /// Produce a recoverable, low-S signature over a 32-byte digest.
    ///
    /// The nonce generator is keyed by `SHA-256(key ‖ fresh randomness ‖ digest)`
    /// so weak system randomness alone cannot leak the key. Nonces yielding a
    /// zero `r` or `s` are retried inside the signer.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Signature {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*digest);
        let mut nonce_data = self.nonce_seed(digest);
        let signature = secp.sign_ecdsa_recoverable_with_noncedata(&message, &self.0, &nonce_data);
        nonce_data.zeroize();
        Signature::from_recoverable(&signature)
    }

    /// Sign the SHA-256 digest of `message`
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.sign_digest(&sha256(message))
    }

    fn nonce_seed(&self, digest: &[u8; 32]) -> [u8; 32] {
        let mut extra = [0u8; 32];
        OsRng.fill_bytes(&mut extra);

        let mut entropy = Vec::with_capacity(SCALAR_SIZE + extra.len() + digest.len());
        entropy.extend_from_slice(&self.0.secret_bytes());
        entropy.extend_from_slice(&extra);
        entropy.extend_from_slice(digest);
        let seed = sha256(&entropy);

        entropy.zeroize();
        extra.zeroize();
        seed
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// A compressed secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(secp256k1::PublicKey);

impl PublicKey {
    /// Parse a 33-byte compressed point
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(KeyError::InvalidPublicKey);
        }
        secp256k1::PublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    /// Compressed encoding: parity byte followed by the x-coordinate
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.serialize()
    }

    /// Get the public key as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Check `signature` over `digest` against this key
    pub fn verify_digest(&self, signature: &Signature, digest: &[u8; 32]) -> bool {
        signature.verify_digest(digest, self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// A recoverable ECDSA signature: `r ‖ s ‖ recovery_id`.
///
/// The recovery id is `2·b + f`, where `b` records whether the nonce point's
/// x-coordinate exceeded the group order and `f` is the parity of its y.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Wrap a 65-byte serialized signature. Only the length is checked here;
    /// range checks happen in [`verify_digest`](Self::verify_digest) and
    /// [`recover_digest`](Self::recover_digest).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; SIGNATURE_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(array))
    }

    fn from_recoverable(signature: &RecoverableSignature) -> Self {
        let (recovery_id, compact) = signature.serialize_compact();
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..2 * SCALAR_SIZE].copy_from_slice(&compact);
        // recovery ids are 0..=3
        bytes[2 * SCALAR_SIZE] = recovery_id.to_i32() as u8;
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..SCALAR_SIZE]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[SCALAR_SIZE..2 * SCALAR_SIZE]
    }

    pub fn recovery_id(&self) -> u8 {
        self.0[2 * SCALAR_SIZE]
    }

    /// Whether `s ≤ N/2`
    pub fn is_low_s(&self) -> bool {
        self.s() <= &HALF_CURVE_ORDER[..]
    }

    fn check_range(&self) -> Result<(), KeyError> {
        if in_scalar_range(self.r()) && in_scalar_range(self.s()) {
            Ok(())
        } else {
            Err(KeyError::OutOfRange)
        }
    }

    /// Verify this signature over `digest` for `public_key`.
    ///
    /// High-S encodings are accepted, since `(r, s)` and `(r, N - s)` are both
    /// valid ECDSA signatures for the same message.
    pub fn verify_digest(&self, digest: &[u8; 32], public_key: &PublicKey) -> bool {
        if self.check_range().is_err() {
            return false;
        }
        let Ok(mut signature) = EcdsaSignature::from_compact(&self.0[..2 * SCALAR_SIZE]) else {
            return false;
        };
        signature.normalize_s();

        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&Message::from_digest(*digest), &signature, &public_key.0)
            .is_ok()
    }

    /// Reconstruct the signer's public key from this signature and `digest`
    pub fn recover_digest(&self, digest: &[u8; 32]) -> Result<PublicKey, KeyError> {
        self.check_range()?;

        let recovery_id = RecoveryId::from_i32(i32::from(self.recovery_id()))
            .map_err(|_| KeyError::Recovery(format!("bad recovery id {}", self.recovery_id())))?;
        let signature =
            RecoverableSignature::from_compact(&self.0[..2 * SCALAR_SIZE], recovery_id)
                .map_err(|e| KeyError::Recovery(e.to_string()))?;

        let secp = Secp256k1::verification_only();
        secp.recover_ecdsa(&Message::from_digest(*digest), &signature)
            .map(PublicKey)
            .map_err(|e| KeyError::Recovery(e.to_string()))
    }

    /// Get the signature as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Generate a new random private key
pub fn generate_private_key() -> PrivateKey {
    PrivateKey::generate()
}

/// Derive the compressed public key of `private_key`
pub fn public_key_of(private_key: &PrivateKey) -> PublicKey {
    private_key.public_key()
}

/// Sign a 32-byte digest
pub fn sign_digest(digest: &[u8; 32], private_key: &PrivateKey) -> Signature {
    private_key.sign_digest(digest)
}

/// Sign the SHA-256 digest of a message
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    private_key.sign_message(message)
}

/// Verify a serialized signature over a digest. Malformed input yields `false`.
pub fn verify_digest(signature: &[u8], digest: &[u8; 32], public_key: &PublicKey) -> bool {
    match Signature::from_bytes(signature) {
        Ok(signature) => signature.verify_digest(digest, public_key),
        Err(_) => false,
    }
}

/// Verify a serialized signature over the SHA-256 digest of a message
pub fn verify_message(signature: &[u8], message: &[u8], public_key: &PublicKey) -> bool {
    verify_digest(signature, &sha256(message), public_key)
}

/// Recover the signer's public key from a serialized signature and digest
pub fn recover_public_key(signature: &[u8], digest: &[u8; 32]) -> Result<PublicKey, KeyError> {
    Signature::from_bytes(signature)?.recover_digest(digest)
}

/// Recover the signer's public key from a serialized signature and message
pub fn recover_from_message(signature: &[u8], message: &[u8]) -> Result<PublicKey, KeyError> {
    recover_public_key(signature, &sha256(message))
}

fn in_scalar_range(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| *b != 0) && bytes < &CURVE_ORDER[..]
}

// N - 1, widened to 320 bits
const ORDER_MINUS_ONE: U320 = U320::from_be_hex(
    "0000000000000000fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140",
);

/// Map 320 uniformly random bits onto `[1, N-1]` as `v mod (N-1) + 1`.
///
/// The 64 surplus bits keep the modulo bias below 2^-64.
fn reduce_wide(wide: &[u8; SCALAR_SIZE + 8]) -> [u8; SCALAR_SIZE] {
    let mut value = U320::from_be_slice(wide);
    let mut reduced = value
        .wrapping_rem(&ORDER_MINUS_ONE)
        .wrapping_add(&U320::ONE);
    let mut encoded = reduced.to_be_bytes();

    let mut out = [0u8; SCALAR_SIZE];
    out.copy_from_slice(&encoded[8..]);
    value.zeroize();
    reduced.zeroize();
    encoded.zeroize();
    out
}
