//! Password-protected account store
//!
//! Maps account names to WIF private keys. Every mutation is written through
//! to disk before it becomes visible in memory.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use super::cipher::{self, KdfParams, SealingKey};
use crate::crypto::bip32::{private_key_from_mnemonic, DerivationError};
use crate::crypto::keys::PublicKey;
use crate::encoding::wif::{private_key_from_wif, private_key_to_wif, WifError};

/// Keystore errors
#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Wrong password or corrupted keystore")]
    WrongPasswordOrCorrupt,
    #[error("Corrupted keystore: {0}")]
    Corrupt(String),
    #[error("Unsupported keystore version {0}")]
    UnsupportedVersion(u32),
    #[error("Key derivation failed: {0}")]
    Kdf(String),
    #[error("Invalid private key: {0}")]
    InvalidKey(#[from] WifError),
    #[error("Mnemonic derivation failed: {0}")]
    Derivation(#[from] DerivationError),
}

/// Keystore configuration
#[derive(Debug, Clone)]
pub struct KeystoreConfig {
    pub path: PathBuf,
    /// Cost parameters for newly created files. Existing files keep their own.
    pub kdf: KdfParams,
}

impl KeystoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kdf: KdfParams::default(),
        }
    }
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(".cos_wallet").join("keystore.json"))
    }
}

#[derive(Serialize, Deserialize)]
struct AccountEntry<'a> {
    #[serde(borrow)]
    name: Cow<'a, str>,
    #[serde(borrow)]
    key: Cow<'a, str>,
}

#[derive(Serialize, Deserialize)]
struct Plaintext<'a> {
    #[serde(borrow)]
    accounts: Vec<AccountEntry<'a>>,
}

type Accounts = BTreeMap<String, Zeroizing<String>>;

struct State {
    accounts: Accounts,
    sealing_key: SealingKey,
}

/// Encrypted, file-backed map of account name to WIF private key
pub struct Keystore {
    path: PathBuf,
    state: Mutex<State>,
}

impl Keystore {
    /// Open the keystore at `config.path`, creating an empty one if the file does not exist
    pub fn open_or_create(config: &KeystoreConfig, password: &str) -> Result<Self, KeystoreError> {
        let path = config.path.clone();

        let state = if path.exists() {
            let data = fs::read(&path)?;
            let (sealing_key, plaintext) = cipher::open(&data, password)?;
            let accounts = parse_accounts(&plaintext)?;
            log::info!(
                "Opened keystore {} with {} accounts",
                path.display(),
                accounts.len()
            );
            State {
                accounts,
                sealing_key,
            }
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let state = State {
                accounts: Accounts::new(),
                sealing_key: SealingKey::generate(password, config.kdf)?,
            };
            persist(&path, &state.sealing_key, &state.accounts)?;
            log::info!("Created keystore {}", path.display());
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// WIF private key stored under `account`
    pub fn get(&self, account: &str) -> Option<String> {
        self.lock()
            .accounts
            .get(account)
            .map(|key| key.as_str().to_string())
    }

    /// Store `wif` under `account`, replacing any previous key
    pub fn add(&self, account: &str, wif: &str) -> Result<(), KeystoreError> {
        private_key_from_wif(wif)?;

        let mut state = self.lock();
        let mut next = state.accounts.clone();
        next.insert(account.to_string(), Zeroizing::new(wif.to_string()));
        persist(&self.path, &state.sealing_key, &next)?;
        state.accounts = next;

        log::debug!("Stored key for account {}", account);
        Ok(())
    }

    /// Derive the signing key from `mnemonic` and store it under `account`
    pub fn add_by_mnemonic(&self, account: &str, mnemonic: &str) -> Result<PublicKey, KeystoreError> {
        let key = private_key_from_mnemonic(mnemonic)?;
        let wif = Zeroizing::new(private_key_to_wif(&key));
        self.add(account, &wif)?;
        Ok(key.public_key())
    }

    /// Delete `account`, returning whether it was present
    pub fn remove(&self, account: &str) -> Result<bool, KeystoreError> {
        let mut state = self.lock();
        let mut next = state.accounts.clone();
        let removed = next.remove(account).is_some();
        persist(&self.path, &state.sealing_key, &next)?;
        state.accounts = next;

        if removed {
            log::debug!("Removed account {}", account);
        }
        Ok(removed)
    }

    /// Account names in sorted order
    pub fn list_accounts(&self) -> Vec<String> {
        self.lock().accounts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().accounts.is_empty()
    }

    // Memory only changes after a successful write, so a poisoned lock still
    // guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("path", &self.path)
            .field("accounts", &self.list_accounts())
            .finish()
    }
}

fn parse_accounts(plaintext: &[u8]) -> Result<Accounts, KeystoreError> {
    let parsed: Plaintext<'_> =
        serde_json::from_slice(plaintext).map_err(|e| KeystoreError::Corrupt(e.to_string()))?;
    Ok(parsed
        .accounts
        .into_iter()
        .map(|entry| (entry.name.into_owned(), Zeroizing::new(entry.key.into_owned())))
        .collect())
}

fn persist(path: &Path, sealing_key: &SealingKey, accounts: &Accounts) -> Result<(), KeystoreError> {
    let plaintext = Plaintext {
        accounts: accounts
            .iter()
            .map(|(name, key)| AccountEntry {
                name: Cow::Borrowed(name.as_str()),
                key: Cow::Borrowed(key.as_str()),
            })
            .collect(),
    };
    let plaintext = Zeroizing::new(serde_json::to_vec(&plaintext)?);
    let sealed = sealing_key.seal(&plaintext)?;

    let temp_path = temp_path(path);
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&sealed)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
