//! Wallet core - the privileged half of a Solana browser wallet
//!
//! Web pages never touch keys. They talk JSON-RPC over a logical stream to
//! the [`mediator`], which tags every request with the origin the transport
//! verified, gates it on the user's authorization, and parks anything that
//! needs consent as a pending action. The extension's own UI drives the
//! [`vault`] and settles those actions.
//!
//! ## Modules
//!
//! - [`vault`] - Mnemonic derivation, password sealing, accounts and persistence
//! - [`actions`] - Queue of requests awaiting a user decision
//! - [`mediator`] - Per-connection RPC pipelines and event fan-out
//! - [`transaction`] - Legacy transaction message parsing
//! - [`decoder`] - Human readable rendering of instructions
//! - [`config`] / [`telemetry`] - Settings file and logging setup
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wallet_core::mediator::{LogicalStream, Mediator, SenderInfo};
//! use wallet_core::network::OfflineNetwork;
//! use wallet_core::{WalletConfig, WalletContext};
//!
//! # async fn run() -> wallet_core::Result<()> {
//! let config = WalletConfig::load()?;
//! wallet_core::telemetry::init(&config.logging)?;
//!
//! let ctx = WalletContext::new(config, Arc::new(OfflineNetwork))?;
//! let mediator = Mediator::new(ctx);
//! mediator.spawn_action_events();
//!
//! let (stream, _peer) = LogicalStream::pair(64);
//! let sender = SenderInfo {
//!     url: Some("https://dapp.example/".into()),
//!     ..Default::default()
//! };
//! let connection = mediator.connect(sender, stream)?;
//! connection.closed().await;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod mediator;
pub mod network;
pub mod secret;
pub mod telemetry;
pub mod transaction;
pub mod types;
pub mod vault;

// Re-export commonly used types
pub use actions::{ActionKey, ActionQueue, SignedMessage};
pub use config::WalletConfig;
pub use context::WalletContext;
pub use error::{Result, WalletError};
pub use mediator::{Mediator, SenderInfo};
pub use secret::SecretString;
pub use types::{Network, Origin, PublicKey, TabId};
pub use vault::{Vault, WalletState};
