//! Process wide wallet state, passed explicitly to every component.

use crate::actions::ActionQueue;
use crate::config::WalletConfig;
use crate::decoder::{DecorateContext, DecoderRegistry, RenderedInstruction};
use crate::error::Result;
use crate::network::NetworkContext;
use crate::transaction::Message;
use crate::vault::{StateStore, Vault, spawn_persistence};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything the mediator and its handlers operate on.
pub struct WalletContext {
    pub vault: Vault,
    pub actions: ActionQueue,
    pub decoders: DecoderRegistry,
    pub network: Arc<dyn NetworkContext>,
    pub config: WalletConfig,
}

impl WalletContext {
    /// Fresh context with an uninitialized vault.
    pub fn new(config: WalletConfig, network: Arc<dyn NetworkContext>) -> Result<Arc<Self>> {
        let vault = Vault::new(config.vault_settings());
        Self::with_vault(config, network, vault)
    }

    /// Context whose vault is restored, locked, from `store` when a record exists.
    pub async fn open(
        config: WalletConfig,
        network: Arc<dyn NetworkContext>,
        store: &dyn StateStore,
    ) -> Result<Arc<Self>> {
        let vault = match store.load().await? {
            Some(state) => {
                info!(version = state.version, "restoring vault from saved state");
                Vault::restore(config.vault_settings(), state.vault)
            }
            None => Vault::new(config.vault_settings()),
        };
        Self::with_vault(config, network, vault)
    }

    fn with_vault(
        config: WalletConfig,
        network: Arc<dyn NetworkContext>,
        vault: Vault,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            vault,
            actions: ActionQueue::new(),
            decoders: DecoderRegistry::with_defaults()?,
            network,
            config,
        }))
    }

    /// Start periodic saves of the vault to `store`.
    pub fn start_persistence(&self, store: Arc<dyn StateStore>) -> JoinHandle<()> {
        spawn_persistence(self.vault.clone(), store, self.config.persistence.interval())
    }

    /// Human readable description of every instruction in `message`.
    pub async fn describe_transaction(&self, message: &Message) -> Vec<RenderedInstruction> {
        let network = self.vault.network();
        let tokens = self.vault.tokens(network);
        let ctx = DecorateContext {
            network,
            tokens: &tokens,
            client: self.network.as_ref(),
        };
        self.decoders.decode_transaction(message, &ctx).await
    }
}

impl std::fmt::Debug for WalletContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletContext")
            .field("vault", &self.vault)
            .field("actions", &self.actions)
            .field("decoders", &self.decoders)
            .finish_non_exhaustive()
    }
}
