//! Password sealing of the mnemonic and seed.
//!
//! The sealing key comes from PBKDF2-HMAC with a random 16-byte salt, and the
//! payload is encrypted with XChaCha20-Poly1305 under a random 24-byte nonce.
//! KDF parameters travel with the blob so older blobs keep opening after the
//! defaults change.

use crate::error::{Result, WalletError};
use crate::secret::SecretString;
use crate::vault::derive::MnemonicSeed;
use chacha20poly1305::{
    Key, XChaCha20Poly1305,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Default PBKDF2 iteration count
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Size of the KDF salt in bytes
pub const SALT_SIZE: usize = 16;

/// Size of the XChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 24;

/// Size of the symmetric key in bytes
pub const KEY_SIZE: usize = 32;

/// Digest used inside PBKDF2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfDigest {
    Sha256,
}

/// Encrypted `{mnemonic, seed}` plus the parameters needed to reopen it.
///
/// Binary fields are base58 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedSecret {
    pub ciphertext: String,
    pub nonce: String,
    pub salt: String,
    pub kdf_iterations: u32,
    pub kdf_digest: KdfDigest,
}

impl SealedSecret {
    /// Encrypt `secret` under `password`.
    pub fn seal(secret: &MnemonicSeed, password: &SecretString, iterations: u32) -> Result<Self> {
        if iterations == 0 {
            return Err(WalletError::Crypto(
                "kdf iterations must be positive".to_string(),
            ));
        }

        let mut salt = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);

        let key = derive_key(password, &salt, iterations, KdfDigest::Sha256)?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let plaintext = Zeroizing::new(serde_json::to_vec(secret)?);

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let ciphertext = cipher
            .encrypt(&nonce.into(), plaintext.as_slice())
            .map_err(|e| WalletError::Crypto(format!("encryption failed: {}", e)))?;

        Ok(Self {
            ciphertext: bs58::encode(ciphertext).into_string(),
            nonce: bs58::encode(nonce).into_string(),
            salt: bs58::encode(salt).into_string(),
            kdf_iterations: iterations,
            kdf_digest: KdfDigest::Sha256,
        })
    }

    /// Decrypt with `password`.
    ///
    /// The KDF always completes before the authentication check, so a wrong
    /// password costs the same as a right one up to the tag comparison.
    pub fn open(&self, password: &SecretString) -> Result<MnemonicSeed> {
        let salt: [u8; SALT_SIZE] = decode_fixed(&self.salt, "salt")?;
        let nonce: [u8; NONCE_SIZE] = decode_fixed(&self.nonce, "nonce")?;
        let ciphertext = bs58::decode(&self.ciphertext)
            .into_vec()
            .map_err(|e| WalletError::Crypto(format!("invalid ciphertext encoding: {}", e)))?;

        let key = derive_key(password, &salt, self.kdf_iterations, self.kdf_digest)?;

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let plaintext = cipher
            .decrypt(&nonce.into(), ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| WalletError::InvalidPassword)?;

        let secret: MnemonicSeed = serde_json::from_slice(&plaintext)?;
        Ok(secret)
    }
}

/// PBKDF2 key of [`KEY_SIZE`] bytes.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8],
    iterations: u32,
    digest: KdfDigest,
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    if iterations == 0 {
        return Err(WalletError::Crypto(
            "kdf iterations must be positive".to_string(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    match digest {
        KdfDigest::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(
            password.expose_secret().as_bytes(),
            salt,
            iterations,
            &mut key[..],
        ),
    }
    Ok(key)
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> Result<[u8; N]> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| WalletError::Crypto(format!("invalid {} encoding: {}", what, e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        WalletError::Crypto(format!(
            "invalid {} length: expected {}, got {}",
            what,
            N,
            bytes.len()
        ))
    })
}
