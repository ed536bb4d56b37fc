//! Encrypted key custody.
//!
//! The vault holds the sealed mnemonic at rest and the derived signing keys
//! in memory while unlocked. It moves through three states:
//!
//! ```text
//!   Uninitialized ──create_vault──▶ Unlocked ◀──unseal── Locked
//!                                      │                    ▲
//!                                      └────────lock────────┘
//! ```
//!
//! Keys exist only in the `Unlocked` state and are rebuilt from the seed on
//! every unseal. Password based key derivation and encryption run on the
//! blocking pool; the state lock is never held across an await point.

pub mod derive;
pub mod seal;
pub mod store;

pub use derive::{Keypair, MnemonicSeed, derive_account, derive_accounts};
pub use seal::{DEFAULT_KDF_ITERATIONS, KdfDigest, SealedSecret};
pub use store::{FileStore, MemoryStore, StateStore, VaultRecord, VersionedState, spawn_persistence};

use crate::error::{Result, WalletError};
use crate::secret::SecretString;
use crate::types::{Network, Origin, PublicKey, TokenMeta, TokenRegistry};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle state of the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletState {
    Uninitialized,
    Locked,
    Unlocked,
}

/// Parameters fixed for the lifetime of a vault handle.
#[derive(Debug, Clone, Copy)]
pub struct VaultSettings {
    /// PBKDF2 iterations used when sealing a new wallet
    pub kdf_iterations: u32,
    /// Wallet level of the derivation path
    pub wallet_index: u32,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            wallet_index: 0,
        }
    }
}

struct Unsealed {
    secret: MnemonicSeed,
    keys: Vec<Keypair>,
}

struct VaultState {
    sealed: Option<SealedSecret>,
    unsealed: Option<Unsealed>,
    account_count: u32,
    selected_account: Option<usize>,
    last_selected: u32,
    network: Network,
    authorized_origins: BTreeSet<Origin>,
    tokens: TokenRegistry,
    /// Bumped on every persisted mutation
    revision: u64,
}

impl VaultState {
    fn empty() -> Self {
        Self {
            sealed: None,
            unsealed: None,
            account_count: 0,
            selected_account: None,
            last_selected: 0,
            network: Network::default(),
            authorized_origins: BTreeSet::new(),
            tokens: TokenRegistry::new(),
            revision: 0,
        }
    }

    fn wallet_state(&self) -> WalletState {
        match (&self.sealed, &self.unsealed) {
            (None, _) => WalletState::Uninitialized,
            (Some(_), None) => WalletState::Locked,
            (Some(_), Some(_)) => WalletState::Unlocked,
        }
    }

    fn unsealed(&self) -> Result<&Unsealed> {
        self.unsealed.as_ref().ok_or(WalletError::Locked)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

/// Shared handle to the single vault instance.
#[derive(Clone)]
pub struct Vault {
    state: Arc<RwLock<VaultState>>,
    settings: VaultSettings,
}

impl Vault {
    /// An empty, uninitialized vault.
    pub fn new(settings: VaultSettings) -> Self {
        Self {
            state: Arc::new(RwLock::new(VaultState::empty())),
            settings,
        }
    }

    /// A locked vault restored from a persisted record.
    pub fn restore(settings: VaultSettings, record: VaultRecord) -> Self {
        let state = VaultState {
            sealed: Some(record.sealed),
            unsealed: None,
            account_count: record.account_count.max(1),
            selected_account: None,
            last_selected: record.selected_account,
            network: record.selected_network,
            authorized_origins: record.authorized_origins.into_iter().collect(),
            tokens: record.tokens,
            revision: 0,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            settings,
        }
    }

    pub fn settings(&self) -> VaultSettings {
        self.settings
    }

    pub fn state(&self) -> WalletState {
        self.state.read().wallet_state()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == WalletState::Unlocked
    }

    /// Seal `secret` under `password`, derive the first account and unlock.
    pub async fn create_vault(&self, secret: MnemonicSeed, password: SecretString) -> Result<()> {
        if self.state.read().sealed.is_some() {
            return Err(WalletError::AlreadyInitialized);
        }

        let iterations = self.settings.kdf_iterations;
        let wallet_index = self.settings.wallet_index;
        let (sealed, secret, first) = tokio::task::spawn_blocking(move || {
            let sealed = SealedSecret::seal(&secret, &password, iterations)?;
            let first = derive_account(&secret.seed, wallet_index, 0)?;
            Ok::<_, WalletError>((sealed, secret, first))
        })
        .await
        .map_err(|e| WalletError::Crypto(format!("sealing task failed: {}", e)))??;

        let mut state = self.state.write();
        if state.sealed.is_some() {
            return Err(WalletError::AlreadyInitialized);
        }
        info!(account = %first.public_key, "wallet created");
        state.sealed = Some(sealed);
        state.unsealed = Some(Unsealed {
            secret,
            keys: vec![first],
        });
        state.account_count = 1;
        state.selected_account = Some(0);
        state.last_selected = 0;
        state.touch();
        Ok(())
    }

    /// Open the sealed blob and rebuild the account keys.
    ///
    /// Already unlocked vaults are left untouched. On any failure the vault
    /// stays locked.
    pub async fn unseal(&self, password: SecretString) -> Result<()> {
        let (sealed, count) = {
            let state = self.state.read();
            match state.wallet_state() {
                WalletState::Uninitialized => return Err(WalletError::NotInitialized),
                WalletState::Unlocked => {
                    info!("unseal requested but vault is already unlocked");
                    return Ok(());
                }
                WalletState::Locked => {}
            }
            let sealed = state.sealed.clone().ok_or(WalletError::NotInitialized)?;
            (sealed, state.account_count.max(1))
        };

        let wallet_index = self.settings.wallet_index;
        let (secret, keys) = tokio::task::spawn_blocking(move || {
            let secret = sealed.open(&password)?;
            let keys = derive_accounts(&secret.seed, wallet_index, count)?;
            Ok::<_, WalletError>((secret, keys))
        })
        .await
        .map_err(|e| WalletError::Crypto(format!("unseal task failed: {}", e)))?
        .inspect_err(|e| {
            if matches!(e, WalletError::InvalidPassword) {
                warn!("unseal failed: invalid password");
            }
        })?;

        let mut state = self.state.write();
        if state.unsealed.is_some() {
            debug!("vault was unlocked concurrently; discarding duplicate keys");
            return Ok(());
        }
        let selected = (state.last_selected as usize).min(keys.len() - 1);
        state.unsealed = Some(Unsealed { secret, keys });
        state.selected_account = Some(selected);
        info!(accounts = count, "vault unlocked");
        Ok(())
    }

    /// Forget every key held in memory. Idempotent.
    pub fn lock(&self) {
        let mut state = self.state.write();
        if state.unsealed.take().is_some() {
            info!("vault locked");
        }
        state.selected_account = None;
    }

    /// Derive the next account on the path and return its address.
    pub fn add_account(&self) -> Result<PublicKey> {
        let mut state = self.state.write();
        let next_index = {
            let unsealed = state.unsealed()?;
            unsealed.keys.len() as u32
        };
        let seed = state.unsealed()?.secret.seed;
        let key = derive_account(&seed, self.settings.wallet_index, next_index)?;
        let public_key = key.public_key;

        if let Some(unsealed) = state.unsealed.as_mut() {
            unsealed.keys.push(key);
        }
        state.account_count = next_index + 1;
        state.touch();
        info!(index = next_index, account = %public_key, "account added");
        Ok(public_key)
    }

    /// Key owning `public_key`, if this wallet holds it.
    pub fn find_account(&self, public_key: &PublicKey) -> Option<Keypair> {
        let state = self.state.read();
        state
            .unsealed
            .as_ref()?
            .keys
            .iter()
            .find(|key| key.public_key == *public_key)
            .cloned()
    }

    /// Addresses of all derived accounts; empty while locked.
    pub fn accounts(&self) -> Vec<PublicKey> {
        let state = self.state.read();
        state
            .unsealed
            .as_ref()
            .map(|u| u.keys.iter().map(|k| k.public_key).collect())
            .unwrap_or_default()
    }

    /// Accounts ordered with the selected one first, the way pages expect them.
    pub fn accounts_for_page(&self) -> Vec<PublicKey> {
        let mut accounts = self.accounts();
        if let Some(index) = self.selected_index() {
            if index < accounts.len() {
                let selected = accounts.remove(index);
                accounts.insert(0, selected);
            }
        }
        accounts
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.state.read().selected_account
    }

    pub fn selected_account(&self) -> Option<PublicKey> {
        let state = self.state.read();
        let index = state.selected_account?;
        state
            .unsealed
            .as_ref()
            .and_then(|u| u.keys.get(index))
            .map(|k| k.public_key)
    }

    pub fn select_account(&self, index: usize) -> Result<PublicKey> {
        let mut state = self.state.write();
        let public_key = state
            .unsealed()?
            .keys
            .get(index)
            .map(|k| k.public_key)
            .ok_or(WalletError::UnknownAccount(index))?;
        state.selected_account = Some(index);
        state.last_selected = index as u32;
        state.touch();
        Ok(public_key)
    }

    pub fn network(&self) -> Network {
        self.state.read().network
    }

    pub fn change_network(&self, network: Network) {
        let mut state = self.state.write();
        if state.network != network {
            info!(%network, "network changed");
            state.network = network;
            state.touch();
        }
    }

    pub fn is_authorized(&self, origin: &Origin) -> bool {
        self.state.read().authorized_origins.contains(origin)
    }

    /// Grant `origin` access to gated methods. Returns `false` if it already had it.
    pub fn authorize(&self, origin: Origin) -> bool {
        let mut state = self.state.write();
        let added = state.authorized_origins.insert(origin);
        if added {
            state.touch();
        }
        added
    }

    pub fn revoke(&self, origin: &Origin) -> bool {
        let mut state = self.state.write();
        let removed = state.authorized_origins.remove(origin);
        if removed {
            state.touch();
        }
        removed
    }

    pub fn authorized_origins(&self) -> Vec<Origin> {
        self.state.read().authorized_origins.iter().cloned().collect()
    }

    pub fn add_token(&self, network: Network, mint: PublicKey, meta: TokenMeta) {
        let mut state = self.state.write();
        state.tokens.insert(network, mint, meta);
        state.touch();
    }

    pub fn remove_token(&self, network: Network, mint: &PublicKey) -> bool {
        let mut state = self.state.write();
        let removed = state.tokens.remove(network, mint).is_some();
        if removed {
            state.touch();
        }
        removed
    }

    pub fn token(&self, network: Network, mint: &PublicKey) -> Option<TokenMeta> {
        self.state.read().tokens.get(network, mint).cloned()
    }

    pub fn tokens(&self, network: Network) -> BTreeMap<PublicKey, TokenMeta> {
        self.state.read().tokens.for_network(network)
    }

    /// Sign `message` with the key owning `public_key`.
    pub fn sign(&self, public_key: &PublicKey, message: &[u8]) -> Result<[u8; 64]> {
        if !self.is_unlocked() {
            return Err(WalletError::Locked);
        }
        let key = self.find_account(public_key).ok_or(WalletError::UnknownSigner)?;
        Ok(key.sign(message))
    }

    /// Revision counter; changes whenever persisted fields change.
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Persistable view of the vault, `None` before a wallet exists.
    pub fn snapshot(&self) -> Option<VaultRecord> {
        let state = self.state.read();
        let sealed = state.sealed.clone()?;
        Some(VaultRecord {
            sealed,
            account_count: state.account_count.max(1),
            selected_network: state.network,
            selected_account: state.last_selected,
            authorized_origins: state.authorized_origins.iter().cloned().collect(),
            tokens: state.tokens.clone(),
        })
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "iron language purpose cargo access peanut insane pencil still burst sing nurse";

    fn fast_vault() -> Vault {
        Vault::new(VaultSettings {
            kdf_iterations: 1_000,
            wallet_index: 0,
        })
    }

    fn seed() -> MnemonicSeed {
        MnemonicSeed::from_phrase(TEST_MNEMONIC).unwrap()
    }

    #[tokio::test]
    async fn test_create_unlocks_with_first_account() {
        let vault = fast_vault();
        assert_eq!(vault.state(), WalletState::Uninitialized);

        vault.create_vault(seed(), "pw".into()).await.unwrap();

        assert_eq!(vault.state(), WalletState::Unlocked);
        assert_eq!(vault.accounts().len(), 1);
        assert_eq!(
            vault.selected_account().unwrap().to_string(),
            "FTTRznSXjgQg8CxfvsgxbKCNTYCZ3m6kNVTxaXyj2zNC"
        );
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let vault = fast_vault();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        let err = vault.create_vault(seed(), "pw".into()).await.unwrap_err();
        assert!(matches!(err, WalletError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_lock_unseal_roundtrip() {
        let vault = fast_vault();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        let second = vault.add_account().unwrap();
        let before = vault.accounts();

        vault.lock();
        assert_eq!(vault.state(), WalletState::Locked);
        assert!(vault.accounts().is_empty());
        assert!(vault.selected_index().is_none());

        vault.unseal("pw".into()).await.unwrap();
        assert_eq!(vault.accounts(), before);
        assert!(vault.find_account(&second).is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_stays_locked() {
        let vault = fast_vault();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        vault.lock();

        let err = vault.unseal("nope".into()).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidPassword));
        assert_eq!(vault.state(), WalletState::Locked);
        assert!(vault.accounts().is_empty());
    }

    #[tokio::test]
    async fn test_unseal_when_unlocked_is_noop() {
        let vault = fast_vault();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        // Wrong password is not even checked when already unlocked
        vault.unseal("whatever".into()).await.unwrap();
        assert!(vault.is_unlocked());
    }

    #[tokio::test]
    async fn test_unseal_uninitialized() {
        let vault = fast_vault();
        let err = vault.unseal("pw".into()).await.unwrap_err();
        assert!(matches!(err, WalletError::NotInitialized));
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let vault = fast_vault();
        vault.lock();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        vault.lock();
        vault.lock();
        assert_eq!(vault.state(), WalletState::Locked);
    }

    #[tokio::test]
    async fn test_add_account_requires_unlock() {
        let vault = fast_vault();
        assert!(matches!(vault.add_account(), Err(WalletError::Locked)));

        vault.create_vault(seed(), "pw".into()).await.unwrap();
        vault.lock();
        assert!(matches!(vault.add_account(), Err(WalletError::Locked)));
    }

    #[tokio::test]
    async fn test_selection_survives_lock() {
        let vault = fast_vault();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        vault.add_account().unwrap();
        let selected = vault.select_account(1).unwrap();

        vault.lock();
        vault.unseal("pw".into()).await.unwrap();
        assert_eq!(vault.selected_account(), Some(selected));
        assert_eq!(vault.accounts_for_page()[0], selected);
    }

    #[tokio::test]
    async fn test_restore_from_snapshot() {
        let vault = fast_vault();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        vault.add_account().unwrap();
        vault.add_account().unwrap();
        vault.change_network(Network::Devnet);
        vault.authorize(Origin::from_url("https://dapp.example").unwrap());
        let accounts = vault.accounts();

        let record = vault.snapshot().unwrap();
        assert_eq!(record.account_count, 3);

        let restored = Vault::restore(vault.settings(), record);
        assert_eq!(restored.state(), WalletState::Locked);
        assert_eq!(restored.network(), Network::Devnet);
        assert!(restored.is_authorized(&Origin::from_url("https://dapp.example").unwrap()));

        restored.unseal("pw".into()).await.unwrap();
        assert_eq!(restored.accounts(), accounts);
    }

    #[tokio::test]
    async fn test_default_iterations_roundtrip() {
        let vault = Vault::new(VaultSettings::default());
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        assert_eq!(
            vault.snapshot().unwrap().sealed.kdf_iterations,
            DEFAULT_KDF_ITERATIONS
        );
        vault.lock();
        vault.unseal("pw".into()).await.unwrap();
        assert!(vault.is_unlocked());
    }

    #[tokio::test]
    async fn test_revision_tracks_mutation() {
        let vault = fast_vault();
        let start = vault.revision();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        let after_create = vault.revision();
        assert!(after_create > start);

        vault.change_network(Network::MainnetBeta);
        assert_eq!(vault.revision(), after_create);

        vault.change_network(Network::Testnet);
        assert!(vault.revision() > after_create);
    }

    #[tokio::test]
    async fn test_sign_with_owned_key() {
        let vault = fast_vault();
        vault.create_vault(seed(), "pw".into()).await.unwrap();
        let account = vault.selected_account().unwrap();
        assert!(vault.sign(&account, b"msg").is_ok());
        assert!(matches!(
            vault.sign(&PublicKey::new([9; 32]), b"msg"),
            Err(WalletError::UnknownSigner)
        ));
        vault.lock();
        assert!(matches!(vault.sign(&account, b"msg"), Err(WalletError::Locked)));
    }
}
