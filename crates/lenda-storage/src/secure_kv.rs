//! Encrypted key/value store
//!
//! Every value is encrypted with the provisioned secret key before it
//! reaches the blob store, so the durable layer only ever sees ciphertext.
//! An entry that no longer decrypts (key rotation, tampering, bit rot) is
//! treated as absent and removed; it is never surfaced as garbage.

use crate::blob_store::BlobStore;
use crate::cipher::SecretCipher;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Cipher-wrapped key/value storage for secrets and PII.
#[derive(Clone)]
pub struct SecureKeyValueStore {
    store: Arc<dyn BlobStore>,
    cipher: Arc<SecretCipher>,
}

impl SecureKeyValueStore {
    /// Create a store encrypting into `store` with `cipher`.
    pub fn new(store: Arc<dyn BlobStore>, cipher: Arc<SecretCipher>) -> Self {
        Self { store, cipher }
    }

    /// The cipher in use (for diagnostics).
    pub fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    /// Encrypt and store `value` under `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let sealed = self.cipher.encrypt_str(value)?;
        self.store.put(key, &sealed)
    }

    /// Fetch and decrypt the value under `key`.
    ///
    /// Undecryptable entries count as absent: the entry is removed, a
    /// warning is logged, and `None` is returned.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(sealed) = self.store.get(key)? else {
            return Ok(None);
        };

        match self.cipher.decrypt_str(&sealed) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "undecryptable entry, dropping");
                if let Err(remove_err) = self.store.remove(key) {
                    tracing::warn!(key, error = %remove_err, "failed to drop corrupt entry");
                }
                Ok(None)
            }
        }
    }

    /// Serialize `value` to JSON and store it encrypted.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.put(key, &json)
    }

    /// Fetch, decrypt, and deserialize the value under `key`.
    ///
    /// A value that decrypts but no longer parses is treated the same as
    /// an undecryptable one.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(json) = self.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "unparseable entry, dropping");
                if let Err(remove_err) = self.store.remove(key) {
                    tracing::warn!(key, error = %remove_err, "failed to drop corrupt entry");
                }
                Ok(None)
            }
        }
    }

    /// Whether `key` holds a value (without decrypting it).
    pub fn contains(&self, key: &str) -> Result<bool> {
        self.store.contains(key)
    }

    /// Remove `key`.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}
