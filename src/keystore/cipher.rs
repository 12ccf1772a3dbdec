//! Keystore file encryption
//!
//! The file is a JSON envelope around a ChaCha20-Poly1305 ciphertext. The
//! key comes from Argon2id over the password and a random per-file salt.
//! The salt and KDF parameters are stored in the envelope and bound to the
//! ciphertext as associated data.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keystore::KeystoreError;

/// Current envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

const KDF_ALGORITHM: &str = "argon2id";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Ceilings on KDF parameters read back from a file
pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;
pub const MAX_ITERATIONS: u32 = 16;
pub const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KdfHeader {
    algorithm: String,
    salt: String,
    #[serde(flatten)]
    params: KdfParams,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    kdf: KdfHeader,
    nonce: String,
    ciphertext: String,
}

/// A password-derived encryption key together with the salt it was derived with
pub(crate) struct SealingKey {
    key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
    params: KdfParams,
}

impl SealingKey {
    /// Derive a key for a new file with a fresh random salt
    pub(crate) fn generate(password: &str, params: KdfParams) -> Result<Self, KeystoreError> {
        check_bounds(&params)?;
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::derive(password, salt, params)
    }

    fn derive(password: &str, salt: [u8; SALT_LEN], params: KdfParams) -> Result<Self, KeystoreError> {
        let argon_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| KeystoreError::Kdf(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(password.as_bytes(), &salt, &mut key[..])
            .map_err(|e| KeystoreError::Kdf(e.to_string()))?;

        Ok(Self { key, salt, params })
    }

    /// Encrypt `plaintext` under a fresh nonce and wrap it in an envelope
    pub(crate) fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let aad = associated_data(ENVELOPE_VERSION, &self.salt);
        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| KeystoreError::Corrupt("encryption failed".to_string()))?;

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            kdf: KdfHeader {
                algorithm: KDF_ALGORITHM.to_string(),
                salt: hex::encode(self.salt),
                params: self.params,
            },
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key[..]))
    }
}

/// Decrypt an envelope, returning the key it was sealed with and the plaintext
pub(crate) fn open(
    data: &[u8],
    password: &str,
) -> Result<(SealingKey, Zeroizing<Vec<u8>>), KeystoreError> {
    let envelope: Envelope =
        serde_json::from_slice(data).map_err(|e| KeystoreError::Corrupt(e.to_string()))?;

    if envelope.version != ENVELOPE_VERSION {
        return Err(KeystoreError::UnsupportedVersion(envelope.version));
    }
    if envelope.kdf.algorithm != KDF_ALGORITHM {
        return Err(KeystoreError::Corrupt(format!(
            "unknown kdf {}",
            envelope.kdf.algorithm
        )));
    }

    let salt: [u8; SALT_LEN] = decode_fixed(&envelope.kdf.salt, "salt")?;
    let nonce: [u8; NONCE_LEN] = decode_fixed(&envelope.nonce, "nonce")?;
    let ciphertext = hex::decode(&envelope.ciphertext)
        .map_err(|e| KeystoreError::Corrupt(format!("ciphertext: {}", e)))?;

    check_bounds(&envelope.kdf.params)?;
    let key = SealingKey::derive(password, salt, envelope.kdf.params)?;
    let aad = associated_data(envelope.version, &salt);
    let plaintext = key
        .cipher()
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| KeystoreError::WrongPasswordOrCorrupt)?;

    Ok((key, Zeroizing::new(plaintext)))
}

/// Files with parameters above the ceilings are treated as corrupt
fn check_bounds(params: &KdfParams) -> Result<(), KeystoreError> {
    let limits = [
        ("memory_kib", params.memory_kib, MAX_MEMORY_KIB),
        ("iterations", params.iterations, MAX_ITERATIONS),
        ("parallelism", params.parallelism, MAX_PARALLELISM),
    ];
    for (field, value, max) in limits {
        if value > max {
            return Err(KeystoreError::Corrupt(format!(
                "kdf {} {} exceeds {}",
                field, value, max
            )));
        }
    }
    Ok(())
}

fn associated_data(version: u32, salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(4 + SALT_LEN);
    aad.extend_from_slice(&version.to_be_bytes());
    aad.extend_from_slice(salt);
    aad
}

fn decode_fixed<const LEN: usize>(text: &str, field: &str) -> Result<[u8; LEN], KeystoreError> {
    let bytes =
        hex::decode(text).map_err(|e| KeystoreError::Corrupt(format!("{}: {}", field, e)))?;
    bytes
        .try_into()
        .map_err(|_| KeystoreError::Corrupt(format!("{} must be {} bytes", field, LEN)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = SealingKey::generate("hunter2", light()).unwrap();
        let sealed = key.seal(b"{\"accounts\":[]}").unwrap();

        let (reopened, plaintext) = open(&sealed, "hunter2").unwrap();
        assert_eq!(plaintext.as_slice(), b"{\"accounts\":[]}");
        assert_eq!(reopened.salt, key.salt);
        assert_eq!(reopened.params, light());
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = SealingKey::generate("pw", light()).unwrap();
        assert_ne!(key.seal(b"same").unwrap(), key.seal(b"same").unwrap());
    }

    #[test]
    fn test_wrong_password() {
        let sealed = SealingKey::generate("right", light())
            .unwrap()
            .seal(b"secret")
            .unwrap();
        assert!(matches!(
            open(&sealed, "wrong"),
            Err(KeystoreError::WrongPasswordOrCorrupt)
        ));
    }

    #[test]
    fn test_tampered_envelope() {
        let key = SealingKey::generate("pw", light()).unwrap();
        let sealed = key.seal(b"secret").unwrap();

        let mut envelope: Envelope = serde_json::from_slice(&sealed).unwrap();
        let mut ciphertext = hex::decode(&envelope.ciphertext).unwrap();
        ciphertext[0] ^= 0x80;
        envelope.ciphertext = hex::encode(ciphertext);
        let tampered = serde_json::to_vec(&envelope).unwrap();
        assert!(matches!(
            open(&tampered, "pw"),
            Err(KeystoreError::WrongPasswordOrCorrupt)
        ));

        assert!(matches!(
            open(b"not json at all", "pw"),
            Err(KeystoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let sealed = SealingKey::generate("pw", light())
            .unwrap()
            .seal(b"x")
            .unwrap();
        let mut envelope: Envelope = serde_json::from_slice(&sealed).unwrap();
        envelope.version = 9;
        let bumped = serde_json::to_vec(&envelope).unwrap();
        assert!(matches!(
            open(&bumped, "pw"),
            Err(KeystoreError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_oversized_kdf_params_rejected() {
        let sealed = SealingKey::generate("pw", light())
            .unwrap()
            .seal(b"x")
            .unwrap();

        let edits: [fn(&mut KdfParams); 3] = [
            |p| p.memory_kib = u32::MAX,
            |p| p.iterations = MAX_ITERATIONS + 1,
            |p| p.parallelism = u32::MAX,
        ];
        for edit in edits {
            let mut envelope: Envelope = serde_json::from_slice(&sealed).unwrap();
            edit(&mut envelope.kdf.params);
            let inflated = serde_json::to_vec(&envelope).unwrap();
            assert!(matches!(
                open(&inflated, "pw"),
                Err(KeystoreError::Corrupt(_))
            ));
        }

        let mut envelope: Envelope = serde_json::from_slice(&sealed).unwrap();
        envelope.kdf.params.iterations = MAX_ITERATIONS;
        let at_limit = serde_json::to_vec(&envelope).unwrap();
        // within bounds, so it reaches the AEAD check
        assert!(matches!(
            open(&at_limit, "pw"),
            Err(KeystoreError::WrongPasswordOrCorrupt)
        ));
    }
}
