//! On-chain state queries used to enrich decoded instructions.

use crate::error::Result;
use crate::types::{PublicKey, TokenMeta};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Account state as returned by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub owner: PublicKey,
    pub lamports: u64,
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub executable: bool,
}

/// Network collaborator.
///
/// Implementations return `Ok(None)` when the account or mint is unknown;
/// `Err` is reserved for transport failures. Decorators treat both the same.
#[async_trait]
pub trait NetworkContext: Send + Sync {
    async fn get_account_info(&self, pubkey: &PublicKey) -> Result<Option<AccountInfo>>;

    async fn get_mint_metadata(&self, mint: &PublicKey) -> Result<Option<TokenMeta>>;
}

/// Network that knows nothing. Used when running without connectivity.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineNetwork;

#[async_trait]
impl NetworkContext for OfflineNetwork {
    async fn get_account_info(&self, _pubkey: &PublicKey) -> Result<Option<AccountInfo>> {
        Ok(None)
    }

    async fn get_mint_metadata(&self, _mint: &PublicKey) -> Result<Option<TokenMeta>> {
        Ok(None)
    }
}

/// Fixed set of accounts and mints, for tests and local tooling.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    accounts: RwLock<HashMap<PublicKey, AccountInfo>>,
    mints: RwLock<HashMap<PublicKey, TokenMeta>>,
}

impl StaticNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, pubkey: PublicKey, info: AccountInfo) {
        self.accounts.write().insert(pubkey, info);
    }

    pub fn insert_mint(&self, mint: PublicKey, meta: TokenMeta) {
        self.mints.write().insert(mint, meta);
    }
}

#[async_trait]
impl NetworkContext for StaticNetwork {
    async fn get_account_info(&self, pubkey: &PublicKey) -> Result<Option<AccountInfo>> {
        Ok(self.accounts.read().get(pubkey).cloned())
    }

    async fn get_mint_metadata(&self, mint: &PublicKey) -> Result<Option<TokenMeta>> {
        Ok(self.mints.read().get(mint).cloned())
    }
}

mod base64_data {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
