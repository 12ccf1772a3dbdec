//! Wallet implementation
//!
//! Ties the keystore to transaction signing. Chain access goes through the
//! [`ChainClient`] trait so the wallet never talks to the network itself.

use std::error::Error as StdError;

use thiserror::Error;

use crate::core::transaction::{
    Operation, SignedTransaction, TransactionBuilder, TransactionError, DEFAULT_EXPIRATION_SECS,
};
use crate::crypto::keys::{PrivateKey, PublicKey};
use crate::encoding::wif::private_key_from_wif;
use crate::keystore::{Keystore, KeystoreConfig, KeystoreError};

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No keystore is open")]
    KeystoreNotOpen,
    #[error("No signing key for account {0}")]
    SigningKeyNotFound(String),
    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Chain client error: {0}")]
    Client(Box<dyn StdError + Send + Sync>),
}

/// Wallet configuration
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub keystore: KeystoreConfig,
    /// Seconds after the head block time at which signed transactions expire
    pub expiration_secs: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keystore: KeystoreConfig::default(),
            expiration_secs: DEFAULT_EXPIRATION_SECS,
        }
    }
}

/// Chain parameters a transaction is signed against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub chain_id: i32,
    /// Raw head block id, at least 12 bytes for meaningful TAPOS fields
    pub head_block_id: Vec<u8>,
    /// Head block time in UTC seconds
    pub head_block_time: u32,
}

/// Access to a chain node
pub trait ChainClient {
    type Error: StdError + Send + Sync + 'static;

    /// Current chain id and head block
    fn chain_state(&self) -> Result<ChainState, Self::Error>;

    /// Hand a signed transaction to the node
    fn broadcast(&self, transaction: &SignedTransaction) -> Result<(), Self::Error>;
}

/// A wallet with an optionally open keystore
pub struct Wallet {
    config: WalletConfig,
    keystore: Option<Keystore>,
}

impl Wallet {
    /// Create a wallet with its keystore closed
    pub fn new(config: WalletConfig) -> Self {
        Self {
            config,
            keystore: None,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Unlock the configured keystore, creating it if needed
    pub fn open_keystore(&mut self, password: &str) -> Result<(), WalletError> {
        let keystore = Keystore::open_or_create(&self.config.keystore, password)?;
        self.keystore = Some(keystore);
        Ok(())
    }

    /// Drop the in-memory keystore
    pub fn close(&mut self) {
        if self.keystore.take().is_some() {
            log::info!("Closed keystore {}", self.config.keystore.path.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.keystore.is_some()
    }

    pub fn keystore(&self) -> Result<&Keystore, WalletError> {
        self.keystore.as_ref().ok_or(WalletError::KeystoreNotOpen)
    }

    pub fn add_key(&self, account: &str, wif: &str) -> Result<(), WalletError> {
        Ok(self.keystore()?.add(account, wif)?)
    }

    pub fn add_key_by_mnemonic(&self, account: &str, mnemonic: &str) -> Result<PublicKey, WalletError> {
        Ok(self.keystore()?.add_by_mnemonic(account, mnemonic)?)
    }

    pub fn remove_key(&self, account: &str) -> Result<bool, WalletError> {
        Ok(self.keystore()?.remove(account)?)
    }

    pub fn accounts(&self) -> Result<Vec<String>, WalletError> {
        Ok(self.keystore()?.list_accounts())
    }

    /// Decoded private key of `account`
    pub fn signing_key(&self, account: &str) -> Result<PrivateKey, WalletError> {
        let wif = self
            .keystore()?
            .get(account)
            .ok_or_else(|| WalletError::SigningKeyNotFound(account.to_string()))?;
        private_key_from_wif(&wif).map_err(|e| WalletError::Keystore(KeystoreError::InvalidKey(e)))
    }

    pub fn public_key(&self, account: &str) -> Result<PublicKey, WalletError> {
        Ok(self.signing_key(account)?.public_key())
    }

    /// Reference the chain's head block, set the expiration and sign as `account`
    pub fn sign_transaction(
        &self,
        account: &str,
        builder: TransactionBuilder,
        chain: &ChainState,
    ) -> Result<SignedTransaction, WalletError> {
        let key = self.signing_key(account)?;
        self.sign_with(&key, builder, chain)
    }

    /// Sign `operations` as `account` against the client's current head and broadcast them
    pub fn submit<C: ChainClient>(
        &self,
        account: &str,
        operations: impl IntoIterator<Item = Operation>,
        client: &C,
    ) -> Result<SignedTransaction, WalletError> {
        let key = self.signing_key(account)?;
        let chain = client
            .chain_state()
            .map_err(|e| WalletError::Client(Box::new(e)))?;

        let builder = operations
            .into_iter()
            .fold(TransactionBuilder::new(), |builder, op| builder.add_operation(op));
        let signed = self.sign_with(&key, builder, &chain)?;

        client
            .broadcast(&signed)
            .map_err(|e| WalletError::Client(Box::new(e)))?;
        log::info!("Broadcast transaction {} from {}", signed.id(), account);
        Ok(signed)
    }

    fn sign_with(
        &self,
        key: &PrivateKey,
        builder: TransactionBuilder,
        chain: &ChainState,
    ) -> Result<SignedTransaction, WalletError> {
        let signed = builder
            .set_reference_block(&chain.head_block_id)
            .set_expiration(
                chain
                    .head_block_time
                    .saturating_add(self.config.expiration_secs),
            )
            .sign_with_key(key, chain.chain_id)?;
        log::debug!(
            "Signed transaction {} for chain {}",
            signed.id(),
            chain.chain_id
        );
        Ok(signed)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("keystore", &self.config.keystore.path)
            .field("open", &self.is_open())
            .finish()
    }
}
