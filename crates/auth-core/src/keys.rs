//! Signing key material and the passphrase-protected key store it loads from
//!
//! A key store is a JSON document holding one or more aliased ECDSA P-256 key
//! pairs. Each private key is an encrypted PKCS#8 PEM (PBES2) unlocked by the
//! key passphrase. The entry list is authenticated with HMAC-SHA256 keyed by
//! the store passphrase, so a wrong store passphrase or an edited file is
//! rejected before any key is decrypted.
//!
//! ```text
//! {
//!   "version": 1,
//!   "entries": [{ "alias": "...", "private_key": "...", "public_key": "..." }],
//!   "mac": "<hex>"
//! }
//! ```

use std::fmt;
use std::path::Path;

use hmac::{Hmac, Mac};
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::{
    der::pem::PemLabel, DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey,
    EncryptedPrivateKeyInfo, LineEnding, PrivateKeyInfo,
};
use pkcs8::pkcs5::pbes2;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::KeyLoadError;

type HmacSha256 = Hmac<Sha256>;

/// Current key store format version
pub const KEY_STORE_VERSION: u32 = 1;

/// PBKDF2 iteration count used by `keygen` when none is given
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// One aliased key pair inside a key store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStoreEntry {
    pub alias: String,
    /// Encrypted PKCS#8 PEM
    pub private_key: String,
    /// SubjectPublicKeyInfo PEM
    pub public_key: String,
}

/// On-disk key store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStore {
    pub version: u32,
    pub entries: Vec<KeyStoreEntry>,
    pub mac: String,
}

impl KeyStore {
    /// Generate a store holding a single fresh P-256 key pair.
    pub fn generate(
        alias: &str,
        store_passphrase: &str,
        key_passphrase: &str,
        pbkdf2_iterations: u32,
    ) -> Result<Self, KeyLoadError> {
        let signing_key = SigningKey::random(&mut OsRng);
        let entry = encrypt_entry(alias, &signing_key, key_passphrase, pbkdf2_iterations)?;
        Self::seal(vec![entry], store_passphrase)
    }

    /// Build a store from entries, computing the integrity MAC.
    pub fn seal(entries: Vec<KeyStoreEntry>, store_passphrase: &str) -> Result<Self, KeyLoadError> {
        let mac = compute_mac(&entries, store_passphrase)?;
        Ok(Self {
            version: KEY_STORE_VERSION,
            entries,
            mac: hex::encode(mac),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyLoadError> {
        let store: KeyStore =
            serde_json::from_slice(bytes).map_err(|e| KeyLoadError::Format(e.to_string()))?;
        if store.version != KEY_STORE_VERSION {
            return Err(KeyLoadError::UnsupportedVersion(store.version));
        }
        Ok(store)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, KeyLoadError> {
        serde_json::to_vec_pretty(self).map_err(|e| KeyLoadError::Format(e.to_string()))
    }

    /// Check the entry list against the MAC in constant time.
    pub fn verify_integrity(&self, store_passphrase: &str) -> Result<(), KeyLoadError> {
        let expected = hex::decode(&self.mac).map_err(|_| KeyLoadError::StoreIntegrity)?;
        let mut mac = new_mac(store_passphrase)?;
        mac.update(&entries_bytes(&self.entries)?);
        mac.verify_slice(&expected)
            .map_err(|_| KeyLoadError::StoreIntegrity)
    }

    pub fn entry(&self, alias: &str) -> Option<&KeyStoreEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }
}

fn new_mac(store_passphrase: &str) -> Result<HmacSha256, KeyLoadError> {
    HmacSha256::new_from_slice(store_passphrase.as_bytes())
        .map_err(|e| KeyLoadError::Format(format!("HMAC error: {}", e)))
}

fn entries_bytes(entries: &[KeyStoreEntry]) -> Result<Vec<u8>, KeyLoadError> {
    serde_json::to_vec(entries).map_err(|e| KeyLoadError::Format(e.to_string()))
}

fn compute_mac(entries: &[KeyStoreEntry], store_passphrase: &str) -> Result<Vec<u8>, KeyLoadError> {
    let mut mac = new_mac(store_passphrase)?;
    mac.update(&entries_bytes(entries)?);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn generation(e: impl fmt::Display) -> KeyLoadError {
    KeyLoadError::Generation(e.to_string())
}

/// Encrypt a signing key into a store entry using PBES2 (PBKDF2-SHA256 + AES-256-CBC).
pub fn encrypt_entry(
    alias: &str,
    signing_key: &SigningKey,
    key_passphrase: &str,
    pbkdf2_iterations: u32,
) -> Result<KeyStoreEntry, KeyLoadError> {
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let der = signing_key.to_pkcs8_der().map_err(generation)?;
    let info = PrivateKeyInfo::try_from(der.as_bytes()).map_err(generation)?;
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(pbkdf2_iterations, &salt, &iv)
        .map_err(generation)?;
    let encrypted = info
        .encrypt_with_params(params, key_passphrase)
        .map_err(generation)?;
    let private_key = encrypted
        .to_pem(EncryptedPrivateKeyInfo::PEM_LABEL, LineEnding::LF)
        .map_err(generation)?;

    let public_key = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(generation)?;

    Ok(KeyStoreEntry {
        alias: alias.to_string(),
        private_key: private_key.to_string(),
        public_key,
    })
}

/// The process-wide signing key pair.
///
/// Constructed once at startup and shared behind an `Arc`; never mutated.
pub struct KeyMaterial {
    alias: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyMaterial {
    /// Load and unlock `alias` from serialized key store bytes.
    pub fn initialize(
        key_store_bytes: &[u8],
        store_passphrase: &str,
        alias: &str,
        key_passphrase: &str,
    ) -> Result<Self, KeyLoadError> {
        let store = KeyStore::from_bytes(key_store_bytes)?;
        store.verify_integrity(store_passphrase)?;

        let entry = store
            .entry(alias)
            .ok_or_else(|| KeyLoadError::AliasNotFound(alias.to_string()))?;

        let signing_key = SigningKey::from_pkcs8_encrypted_pem(&entry.private_key, key_passphrase)
            .map_err(|e| KeyLoadError::KeyDecryption(e.to_string()))?;
        let verifying_key = VerifyingKey::from_public_key_pem(&entry.public_key)
            .map_err(|e| KeyLoadError::PublicKey(e.to_string()))?;

        if signing_key.verifying_key() != &verifying_key {
            return Err(KeyLoadError::KeyMismatch(alias.to_string()));
        }

        tracing::info!("Loaded signing key '{}' from key store", alias);

        Ok(Self {
            alias: alias.to_string(),
            signing_key,
            verifying_key,
        })
    }

    /// Read a key store file and unlock `alias`.
    pub fn load(
        path: impl AsRef<Path>,
        store_passphrase: &str,
        alias: &str,
        key_passphrase: &str,
    ) -> Result<Self, KeyLoadError> {
        let path = path.as_ref();
        tracing::info!("Reading key store: {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::initialize(&bytes, store_passphrase, alias, key_passphrase)
    }

    /// Wrap an in-memory key (no store involved).
    pub fn from_signing_key(alias: impl Into<String>, signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        Self {
            alias: alias.into(),
            signing_key,
            verifying_key,
        }
    }

    /// Fresh random key pair, for tests and ephemeral deployments.
    pub fn generate(alias: impl Into<String>) -> Self {
        Self::from_signing_key(alias, SigningKey::random(&mut OsRng))
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn private_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("alias", &self.alias)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
