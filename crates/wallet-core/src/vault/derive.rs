//! Hierarchical account derivation from a BIP39 mnemonic.
//!
//! - BIP39 turns the mnemonic into a 64-byte seed (empty passphrase)
//! - BIP32 over secp256k1 walks `m/501'/<wallet>'/0/<account>`
//! - The 32 derived private key bytes seed an Ed25519 signing key
//!
//! The same seed and index always yield the same key, so derived keys are
//! never stored; they are rebuilt every time the vault is unsealed.

use crate::error::{Result, WalletError};
use crate::secret::SecretString;
use crate::types::PublicKey;
use bip39::{Language, Mnemonic};
use bitcoin::Network as BitcoinNetwork;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::key::Secp256k1;
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

/// Purpose level of the derivation path
pub const DERIVATION_PURPOSE: u32 = 501;

/// Size of a BIP39 seed
pub const SEED_SIZE: usize = 64;

/// Mnemonic phrase plus the binary seed derived from it.
#[derive(Clone, Serialize, Deserialize)]
pub struct MnemonicSeed {
    pub mnemonic: String,
    #[serde(with = "hex_seed")]
    pub seed: [u8; SEED_SIZE],
}

impl MnemonicSeed {
    /// Parse a phrase and derive its seed.
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase.trim())
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Self {
            mnemonic: mnemonic.to_string(),
            seed: mnemonic.to_seed(""),
        })
    }

    /// Generate a fresh 12 or 24 word phrase from OS randomness.
    pub fn generate(word_count: usize) -> Result<Self> {
        let entropy_len = match word_count {
            12 => 16,
            24 => 32,
            other => {
                return Err(WalletError::InvalidParams(format!(
                    "word count must be 12 or 24, got {}",
                    other
                )));
            }
        };
        let mut entropy = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(&mut entropy[..entropy_len]);
        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..entropy_len])
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Self::from_phrase(&mnemonic.to_string())
    }

    pub fn phrase(&self) -> SecretString {
        SecretString::new(self.mnemonic.clone())
    }

    pub fn seed_hex(&self) -> String {
        hex::encode(self.seed)
    }
}

impl Drop for MnemonicSeed {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
        self.seed.zeroize();
    }
}

impl std::fmt::Debug for MnemonicSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MnemonicSeed")
            .field("mnemonic", &"[redacted]")
            .field("seed", &"[redacted]")
            .finish()
    }
}

/// A derived signing key.
#[derive(Clone)]
pub struct Keypair {
    /// Position on the derivation path
    pub index: u32,
    /// Account address
    pub public_key: PublicKey,
    signing_key: SigningKey,
}

impl Keypair {
    pub fn from_secret_bytes(index: u32, secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let public_key = PublicKey::new(signing_key.verifying_key().to_bytes());
        Self {
            index,
            public_key,
            signing_key,
        }
    }

    /// Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("index", &self.index)
            .field("public_key", &self.public_key)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

/// Derive the account at `m/501'/<wallet_index>'/0/<account_index>`.
pub fn derive_account(seed: &[u8; SEED_SIZE], wallet_index: u32, account_index: u32) -> Result<Keypair> {
    let secp = Secp256k1::new();

    // The network only affects serialization, not the derived key material
    let master = Xpriv::new_master(BitcoinNetwork::Bitcoin, seed)
        .map_err(|e| WalletError::Crypto(e.to_string()))?;

    let path = DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(DERIVATION_PURPOSE)
            .map_err(|e| WalletError::Crypto(e.to_string()))?,
        ChildNumber::from_hardened_idx(wallet_index)
            .map_err(|e| WalletError::Crypto(e.to_string()))?,
        ChildNumber::from_normal_idx(0).map_err(|e| WalletError::Crypto(e.to_string()))?,
        ChildNumber::from_normal_idx(account_index)
            .map_err(|e| WalletError::Crypto(e.to_string()))?,
    ]);

    let derived = master
        .derive_priv(&secp, &path)
        .map_err(|e| WalletError::Crypto(e.to_string()))?;

    let secret = Zeroizing::new(derived.private_key.secret_bytes());
    Ok(Keypair::from_secret_bytes(account_index, &secret))
}

/// Derive accounts `0..count`.
pub fn derive_accounts(seed: &[u8; SEED_SIZE], wallet_index: u32, count: u32) -> Result<Vec<Keypair>> {
    (0..count)
        .map(|index| derive_account(seed, wallet_index, index))
        .collect()
}

mod hex_seed {
    use super::SEED_SIZE;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(seed: &[u8; SEED_SIZE], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(seed))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; SEED_SIZE], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("seed must be 64 bytes"))
    }
}
