//! Persistence of the vault record.
//!
//! The core never blocks on storage: a background task snapshots the vault
//! on a fixed interval and hands the snapshot to a [`StateStore`], one write
//! at a time. Failed writes are logged and retried on the next tick.

use crate::error::{Result, WalletError};
use crate::types::{Network, Origin, TokenRegistry};
use crate::vault::Vault;
use crate::vault::seal::SealedSecret;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Current record format version
pub const RECORD_VERSION: u32 = 1;

/// Everything the vault persists. Derived keys are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    #[serde(flatten)]
    pub sealed: SealedSecret,
    pub account_count: u32,
    pub selected_network: Network,
    pub selected_account: u32,
    #[serde(default)]
    pub authorized_origins: Vec<Origin>,
    #[serde(default)]
    pub tokens: TokenRegistry,
}

/// A record tagged with its format version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedState {
    pub version: u32,
    pub vault: VaultRecord,
}

impl VersionedState {
    pub fn new(vault: VaultRecord) -> Self {
        Self {
            version: RECORD_VERSION,
            vault,
        }
    }
}

/// Storage collaborator for the vault record.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last saved state, `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<VersionedState>>;

    /// Replace the saved state.
    async fn save(&self, state: &VersionedState) -> Result<()>;
}

/// JSON file on disk, readable by the owner only on Unix.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self) -> Result<Option<VersionedState>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path).await?;
        let state: VersionedState = serde_json::from_str(&json)?;
        if state.version > RECORD_VERSION {
            return Err(WalletError::Config(format!(
                "vault record version {} is newer than supported version {}",
                state.version, RECORD_VERSION
            )));
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &VersionedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write next to the target and rename so a crash never leaves half a record
        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory store, used by tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<VersionedState>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn snapshot(&self) -> Option<VersionedState> {
        self.state.lock().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<VersionedState>> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, state: &VersionedState) -> Result<()> {
        *self.state.lock() = Some(state.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

/// Periodically save the vault whenever it changed since the last write.
///
/// Writes run one at a time on this task, so a record on disk is never
/// older than one that was already written. A failed write leaves the
/// revision dirty and the next tick tries again.
pub fn spawn_persistence(
    vault: Vault,
    store: Arc<dyn StateStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut saved_revision = 0u64;

        loop {
            ticker.tick().await;

            let revision = vault.revision();
            if revision == saved_revision {
                continue;
            }
            let Some(record) = vault.snapshot() else {
                continue;
            };

            match store.save(&VersionedState::new(record)).await {
                Ok(()) => {
                    saved_revision = revision;
                    debug!(revision, "vault state persisted");
                }
                Err(e) => warn!("failed to persist vault state: {}", e),
            }
        }
    })
}
