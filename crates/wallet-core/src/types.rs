//! Shared value types: keys, origins, networks and token metadata.

use crate::error::{Result, WalletError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Size of an Ed25519 public key / account address in bytes
pub const PUBKEY_SIZE: usize = 32;

/// A 32-byte account address, displayed in base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKey(pub [u8; PUBKEY_SIZE]);

impl PublicKey {
    pub const fn new(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; PUBKEY_SIZE] = bytes.try_into().map_err(|_| {
            WalletError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBKEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_bytes(&self) -> [u8; PUBKEY_SIZE] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    /// Short `abcd..wxyz` form for rendering.
    pub fn abbreviated(&self) -> String {
        let full = self.to_string();
        if full.len() <= 10 {
            return full;
        }
        format!("{}..{}", &full[..4], &full[full.len() - 4..])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl FromStr for PublicKey {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| WalletError::InvalidPublicKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Verified web origin (`scheme://host[:port]`) of a requesting page.
///
/// Only the transport layer constructs these, from the sender identity of a
/// connection. Values supplied inside a request body are never turned into
/// an `Origin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Derive the origin of a page URL.
    pub fn from_url(page_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(page_url)
            .map_err(|e| WalletError::InvalidParams(format!("invalid sender url: {}", e)))?;
        let origin = parsed.origin();
        if !origin.is_tuple() {
            // Extension pages have opaque origins in the URL standard but a stable host
            if let ("chrome-extension" | "moz-extension", Some(host)) =
                (parsed.scheme(), parsed.host_str())
            {
                return Ok(Self(format!("{}://{}", parsed.scheme(), host)));
            }
            return Err(WalletError::InvalidParams(format!(
                "sender url has an opaque origin: {}",
                page_url
            )));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Browser tab identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl TabId {
    /// Used when the sender is not attached to a tab.
    pub const NONE: TabId = TabId(-1);
}

impl Default for TabId {
    fn default() -> Self {
        TabId::NONE
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster the wallet talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    #[default]
    MainnetBeta,
    Devnet,
    Testnet,
    Localnet,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::MainnetBeta,
        Network::Devnet,
        Network::Testnet,
        Network::Localnet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::MainnetBeta => "mainnet-beta",
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Localnet => "localnet",
        }
    }

    /// Public RPC endpoint used when the configuration does not override it.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Network::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Network::Devnet => "https://api.devnet.solana.com",
            Network::Testnet => "https://api.testnet.solana.com",
            Network::Localnet => "http://127.0.0.1:8899",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        Network::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| WalletError::InvalidParams(format!("unknown network: {}", s)))
    }
}

/// Display metadata of a token mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMeta {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

/// Per-network registry of known token mints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenRegistry(BTreeMap<Network, BTreeMap<PublicKey, TokenMeta>>);

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a mint. Returns the previous metadata, if any.
    pub fn insert(&mut self, network: Network, mint: PublicKey, meta: TokenMeta) -> Option<TokenMeta> {
        self.0.entry(network).or_default().insert(mint, meta)
    }

    pub fn remove(&mut self, network: Network, mint: &PublicKey) -> Option<TokenMeta> {
        let tokens = self.0.get_mut(&network)?;
        let removed = tokens.remove(mint);
        if tokens.is_empty() {
            self.0.remove(&network);
        }
        removed
    }

    pub fn get(&self, network: Network, mint: &PublicKey) -> Option<&TokenMeta> {
        self.0.get(&network).and_then(|tokens| tokens.get(mint))
    }

    /// All mints known on one network.
    pub fn for_network(&self, network: Network) -> BTreeMap<PublicKey, TokenMeta> {
        self.0.get(&network).cloned().unwrap_or_default()
    }
}
