//! Device preferences
//!
//! Small per-device settings the app needs before sign-in. They ride the
//! encrypted store because the remembered phone number is PII.

use crate::secure_kv::SecureKeyValueStore;
use crate::Result;

const BIOMETRIC_KEY: &str = "prefs.biometric_login";
const LAST_PHONE_KEY: &str = "prefs.last_login_phone";
const LANGUAGE_KEY: &str = "prefs.language";

/// Device-local preferences.
#[derive(Clone)]
pub struct Preferences {
    kv: SecureKeyValueStore,
}

impl Preferences {
    /// Wrap an encrypted key/value store.
    pub fn new(kv: SecureKeyValueStore) -> Self {
        Self { kv }
    }

    /// Enable or disable biometric unlock.
    pub fn set_biometric_login(&self, enabled: bool) -> Result<()> {
        self.kv.put_json(BIOMETRIC_KEY, &enabled)
    }

    /// Whether biometric unlock is enabled. Defaults to off.
    pub fn biometric_login_enabled(&self) -> Result<bool> {
        Ok(self.kv.get_json(BIOMETRIC_KEY)?.unwrap_or(false))
    }

    /// Remember the phone number last used to sign in.
    pub fn set_last_login_phone(&self, phone: &str) -> Result<()> {
        self.kv.put(LAST_PHONE_KEY, phone)
    }

    /// The phone number last used to sign in, if remembered.
    pub fn last_login_phone(&self) -> Result<Option<String>> {
        self.kv.get(LAST_PHONE_KEY)
    }

    /// Forget the remembered phone number.
    pub fn clear_last_login_phone(&self) -> Result<()> {
        self.kv.remove(LAST_PHONE_KEY)
    }

    /// Set the preferred UI language as a BCP 47 tag.
    pub fn set_language(&self, tag: &str) -> Result<()> {
        self.kv.put(LANGUAGE_KEY, tag)
    }

    /// The preferred UI language, if one was chosen.
    pub fn language(&self) -> Result<Option<String>> {
        self.kv.get(LANGUAGE_KEY)
    }

    /// Reset every preference to its default.
    pub fn reset(&self) -> Result<()> {
        self.kv.remove(BIOMETRIC_KEY)?;
        self.kv.remove(LAST_PHONE_KEY)?;
        self.kv.remove(LANGUAGE_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::MemoryBlobStore;
    use crate::cipher::SecretCipher;
    use crate::keystore::{KeyMaterial, KeyTier};
    use std::sync::Arc;

    fn prefs() -> Preferences {
        let blobs = Arc::new(MemoryBlobStore::new());
        let cipher = Arc::new(SecretCipher::new(KeyMaterial::generate(
            "prefs".to_string(),
            KeyTier::Minimal,
        )));
        Preferences::new(SecureKeyValueStore::new(blobs, cipher))
    }

    #[test]
    fn test_biometric_defaults_off() {
        let prefs = prefs();
        assert!(!prefs.biometric_login_enabled().unwrap());

        prefs.set_biometric_login(true).unwrap();
        assert!(prefs.biometric_login_enabled().unwrap());
    }

    #[test]
    fn test_last_login_phone_roundtrip() {
        let prefs = prefs();
        assert_eq!(prefs.last_login_phone().unwrap(), None);

        prefs.set_last_login_phone("+254712345678").unwrap();
        assert_eq!(
            prefs.last_login_phone().unwrap().as_deref(),
            Some("+254712345678")
        );

        prefs.clear_last_login_phone().unwrap();
        assert_eq!(prefs.last_login_phone().unwrap(), None);
    }

    #[test]
    fn test_language() {
        let prefs = prefs();
        assert_eq!(prefs.language().unwrap(), None);
        prefs.set_language("sw-KE").unwrap();
        assert_eq!(prefs.language().unwrap().as_deref(), Some("sw-KE"));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let prefs = prefs();
        prefs.set_biometric_login(true).unwrap();
        prefs.set_last_login_phone("+254712345678").unwrap();
        prefs.set_language("sw-KE").unwrap();

        prefs.reset().unwrap();
        assert!(!prefs.biometric_login_enabled().unwrap());
        assert_eq!(prefs.last_login_phone().unwrap(), None);
        assert_eq!(prefs.language().unwrap(), None);
    }
}
