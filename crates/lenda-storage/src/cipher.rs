//! Secret encryption over platform-provisioned keys
//!
//! Implements AES-256-GCM for field-level secret encryption, the tiered
//! key-provisioning chain, and a round-trip self-test that gates every key
//! before it is trusted. Decryption fails closed: any tampered or truncated
//! blob is an error, never silently empty output.

use crate::keystore::{KeyMaterial, KeySpec, KeyStoreCapabilities, KeyTier, PlatformKeyStore};
use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

const BLOB_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const SELF_TEST_MARKER: &[u8] = b"lenda-secret-cipher-probe";

/// One encrypted value: random IV plus AES-GCM ciphertext (tag included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBlob {
    /// Per-encryption random nonce
    pub iv: [u8; NONCE_LEN],
    /// Ciphertext with the 16-byte authentication tag appended
    pub ciphertext: Vec<u8>,
}

impl SecretBlob {
    /// Encode to the stored string form.
    ///
    /// Layout before base64: `[version(1)][iv(12)][ciphertext(variable)]`.
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(1 + NONCE_LEN + self.ciphertext.len());
        raw.push(BLOB_VERSION);
        raw.extend_from_slice(&self.iv);
        raw.extend_from_slice(&self.ciphertext);
        BASE64.encode(raw)
    }

    /// Decode the stored string form.
    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| Error::Encryption(format!("Invalid blob encoding: {e}")))?;

        if raw.len() < 1 + NONCE_LEN {
            return Err(Error::Encryption("Blob too short".to_string()));
        }
        if raw[0] != BLOB_VERSION {
            return Err(Error::Encryption(format!(
                "Unsupported blob version: {}",
                raw[0]
            )));
        }

        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&raw[1..1 + NONCE_LEN]);
        Ok(Self {
            iv,
            ciphertext: raw[1 + NONCE_LEN..].to_vec(),
        })
    }
}

/// Field-level secret cipher bound to one provisioned key.
pub struct SecretCipher {
    key: KeyMaterial,
}

impl SecretCipher {
    /// Wrap already-provisioned key material.
    pub fn new(key: KeyMaterial) -> Self {
        Self { key }
    }

    /// Obtain a working cipher from the platform key store.
    ///
    /// An existing key under `key_name` is reused if it passes the
    /// self-test; one that fails is deleted and recreated. Creation walks
    /// the tier chain strongest-first, consulting the reported capabilities
    /// and isolating each attempt so one tier's failure cannot poison the
    /// next.
    pub fn provision(keystore: &dyn PlatformKeyStore, key_name: &str) -> Result<Self> {
        match keystore.load_key(key_name) {
            Ok(Some(existing)) => {
                let cipher = Self::new(existing);
                match cipher.self_test() {
                    Ok(()) => {
                        tracing::debug!(
                            key = key_name,
                            tier = %cipher.tier(),
                            "reusing provisioned key"
                        );
                        return Ok(cipher);
                    }
                    Err(e) => {
                        tracing::warn!(
                            key = key_name,
                            error = %e,
                            "stored key failed self-test, recreating"
                        );
                        keystore.delete_key(key_name)?;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = key_name, error = %e, "stored key unreadable, recreating");
                keystore.delete_key(key_name)?;
            }
        }

        let caps = keystore.capabilities();
        let mut last_err: Option<Error> = None;

        for tier in KeyTier::fallback_chain() {
            if !tier.available(&caps) {
                tracing::debug!(key = key_name, %tier, "tier unavailable, skipping");
                continue;
            }

            match keystore.create_key(key_name, &KeySpec::for_tier(tier)) {
                Ok(material) => {
                    let cipher = Self::new(material);
                    match cipher.self_test() {
                        Ok(()) => {
                            tracing::info!(key = key_name, %tier, "provisioned secret key");
                            return Ok(cipher);
                        }
                        Err(e) => {
                            tracing::warn!(
                                key = key_name,
                                %tier,
                                error = %e,
                                "created key failed self-test, trying next tier"
                            );
                            let _ = keystore.delete_key(key_name);
                            last_err = Some(e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        key = key_name,
                        %tier,
                        error = %e,
                        "tier creation failed, trying next tier"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::KeyStore("no usable key tier available".to_string())))
    }

    /// Tier of the underlying key.
    pub fn tier(&self) -> KeyTier {
        self.key.tier()
    }

    /// Name of the underlying key within the platform store.
    pub fn key_name(&self) -> &str {
        self.key.name()
    }

    /// Encrypt bytes under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SecretBlob> {
        let cipher = self.cipher()?;

        let mut iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Encryption(e.to_string()))?;

        Ok(SecretBlob { iv, ciphertext })
    }

    /// Decrypt a blob, failing on any authentication mismatch.
    pub fn decrypt(&self, blob: &SecretBlob) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;
        let nonce = Nonce::from_slice(&blob.iv);

        cipher
            .decrypt(nonce, blob.ciphertext.as_slice())
            .map_err(|e| Error::Encryption(e.to_string()))
    }

    /// Encrypt a string to the stored blob form.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String> {
        Ok(self.encrypt(plaintext.as_bytes())?.encode())
    }

    /// Decrypt the stored blob form back to a string.
    pub fn decrypt_str(&self, encoded: &str) -> Result<String> {
        let blob = SecretBlob::decode(encoded)?;
        let plaintext = self.decrypt(&blob)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::Encryption("Decrypted value is not valid UTF-8".to_string()))
    }

    /// Round-trip self-test run before a key is trusted.
    ///
    /// Verifies that a marker encrypts and decrypts back to itself and
    /// that a tampered ciphertext is rejected. Unusable key material
    /// (wrong length, invalidated platform entry) fails here.
    pub fn self_test(&self) -> Result<()> {
        let blob = self.encrypt(SELF_TEST_MARKER)?;
        let round = self.decrypt(&blob)?;
        if round != SELF_TEST_MARKER {
            return Err(Error::Encryption(
                "Self-test round-trip mismatch".to_string(),
            ));
        }

        let mut tampered = blob.clone();
        tampered.ciphertext[0] ^= 0x01;
        if self.decrypt(&tampered).is_ok() {
            return Err(Error::Encryption(
                "Self-test accepted tampered ciphertext".to_string(),
            ));
        }

        Ok(())
    }

    /// Snapshot of the security posture for support logs.
    pub fn diagnostics(&self, caps: &KeyStoreCapabilities) -> SecurityDiagnostics {
        SecurityDiagnostics {
            key_fingerprint: fingerprint(self.key.name()),
            tier: self.tier(),
            platform: caps.platform,
            has_secure_hardware: caps.has_secure_hardware,
            self_test_passed: self.self_test().is_ok(),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.key.as_bytes())
            .map_err(|_| Error::Encryption("Key material has invalid length".to_string()))
    }
}

/// Security posture snapshot, safe to log.
#[derive(Debug, Clone)]
pub struct SecurityDiagnostics {
    /// Short hash of the key name, never the material
    pub key_fingerprint: String,
    /// Tier the active key was created under
    pub tier: KeyTier,
    /// Platform reported by the key store
    pub platform: crate::keystore::Platform,
    /// Whether the device advertises secure hardware
    pub has_secure_hardware: bool,
    /// Result of the round-trip self-test at snapshot time
    pub self_test_passed: bool,
}

// Hash of the key NAME only; logging anything derived from the material
// itself is off the table.
fn fingerprint(key_name: &str) -> String {
    let digest = Sha256::digest(key_name.as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{MockKeyStore, Platform};

    fn software_caps() -> KeyStoreCapabilities {
        KeyStoreCapabilities {
            has_secure_hardware: false,
            has_strongbox: false,
            has_secure_enclave: false,
            supports_randomized_encryption: true,
            platform: Platform::Linux,
        }
    }

    fn hardware_caps() -> KeyStoreCapabilities {
        KeyStoreCapabilities {
            has_secure_hardware: true,
            has_strongbox: true,
            has_secure_enclave: false,
            supports_randomized_encryption: true,
            platform: Platform::Android,
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = SecretCipher::new(KeyMaterial::generate(
            "k".to_string(),
            KeyTier::Minimal,
        ));
        let plaintext = b"account secret";

        let blob = cipher.encrypt(plaintext).unwrap();
        assert_ne!(blob.ciphertext.as_slice(), plaintext.as_slice());

        let decrypted = cipher.decrypt(&blob).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_each_encryption_uses_fresh_iv() {
        let cipher = SecretCipher::new(KeyMaterial::generate(
            "k".to_string(),
            KeyTier::Minimal,
        ));
        let a = cipher.encrypt(b"same input").unwrap();
        let b = cipher.encrypt(b"same input").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = SecretCipher::new(KeyMaterial::generate(
            "k".to_string(),
            KeyTier::Minimal,
        ));
        let mut blob = cipher.encrypt(b"payload").unwrap();
        blob.ciphertext[3] ^= 0xFF;
        assert!(cipher.decrypt(&blob).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let cipher1 = SecretCipher::new(KeyMaterial::generate(
            "k1".to_string(),
            KeyTier::Minimal,
        ));
        let cipher2 = SecretCipher::new(KeyMaterial::generate(
            "k2".to_string(),
            KeyTier::Minimal,
        ));
        let blob = cipher1.encrypt(b"payload").unwrap();
        assert!(cipher2.decrypt(&blob).is_err());
    }

    #[test]
    fn test_blob_string_roundtrip() {
        let cipher = SecretCipher::new(KeyMaterial::generate(
            "k".to_string(),
            KeyTier::Minimal,
        ));
        let encoded = cipher.encrypt_str("hello vault").unwrap();

        let blob = SecretBlob::decode(&encoded).unwrap();
        assert_eq!(blob.encode(), encoded);
        assert_eq!(cipher.decrypt_str(&encoded).unwrap(), "hello vault");
    }

    #[test]
    fn test_blob_decode_rejects_garbage() {
        assert!(SecretBlob::decode("not base64 !!!").is_err());
        assert!(SecretBlob::decode(&BASE64.encode([1u8, 2, 3])).is_err());
        // Valid length, unknown version byte.
        let mut raw = vec![9u8];
        raw.extend_from_slice(&[0u8; 12]);
        raw.extend_from_slice(b"ciphertext");
        assert!(SecretBlob::decode(&BASE64.encode(raw)).is_err());
    }

    #[test]
    fn test_provision_prefers_hardware() {
        let store = MockKeyStore::with_capabilities(hardware_caps());
        let cipher = SecretCipher::provision(&store, "app_secret").unwrap();
        assert_eq!(cipher.tier(), KeyTier::HardwareBacked);
    }

    #[test]
    fn test_provision_falls_back_when_hardware_absent() {
        let store = MockKeyStore::with_capabilities(software_caps());
        let cipher = SecretCipher::provision(&store, "app_secret").unwrap();
        assert_eq!(cipher.tier(), KeyTier::SoftwareBacked);
    }

    #[test]
    fn test_provision_falls_back_on_hardware_failure() {
        // Capabilities advertise hardware, creation still fails; the chain
        // must move on rather than surface the failure.
        let store = MockKeyStore::with_capabilities(hardware_caps());
        store.fail_tier(KeyTier::HardwareBacked);
        let cipher = SecretCipher::provision(&store, "app_secret").unwrap();
        assert_eq!(cipher.tier(), KeyTier::SoftwareBacked);
    }

    #[test]
    fn test_provision_minimal_as_last_resort() {
        let store = MockKeyStore::with_capabilities(KeyStoreCapabilities::default());
        let cipher = SecretCipher::provision(&store, "app_secret").unwrap();
        assert_eq!(cipher.tier(), KeyTier::Minimal);
    }

    #[test]
    fn test_provision_reuses_existing_key() {
        let store = MockKeyStore::with_capabilities(software_caps());
        let first = SecretCipher::provision(&store, "app_secret").unwrap();
        let sealed = first.encrypt_str("persisted secret").unwrap();

        let second = SecretCipher::provision(&store, "app_secret").unwrap();
        assert_eq!(second.decrypt_str(&sealed).unwrap(), "persisted secret");
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn test_provision_recreates_broken_key() {
        let store = MockKeyStore::with_capabilities(software_caps());
        let first = SecretCipher::provision(&store, "app_secret").unwrap();
        let sealed = first.encrypt_str("old secret").unwrap();

        store.break_key("app_secret");
        let second = SecretCipher::provision(&store, "app_secret").unwrap();

        // New key works for new writes; blobs sealed under the lost key
        // fail closed instead of decrypting to garbage.
        assert!(second.self_test().is_ok());
        assert!(second.decrypt_str(&sealed).is_err());
    }

    #[test]
    fn test_diagnostics_reports_tier_and_health() {
        let store = MockKeyStore::with_capabilities(hardware_caps());
        let cipher = SecretCipher::provision(&store, "app_secret").unwrap();
        let diag = cipher.diagnostics(&store.capabilities());

        assert_eq!(diag.tier, KeyTier::HardwareBacked);
        assert!(diag.has_secure_hardware);
        assert!(diag.self_test_passed);
        assert_eq!(diag.key_fingerprint.len(), 8);
    }
}
