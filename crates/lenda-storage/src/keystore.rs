//! Platform key-store integration for secret-key provisioning
//!
//! Provides a unified interface to platform-specific key storage:
//! - Android: Keystore with StrongBox detection
//! - iOS/macOS: Keychain with Secure Enclave
//! - Windows: DPAPI (Data Protection API)
//! - Linux: libsecret (GNOME Keyring / KDE Wallet)
//!
//! Implementations are handed to the storage layer explicitly; there is no
//! process-global registration. Tier selection is driven by the reported
//! capabilities, never by platform version probing.

use crate::{Error, Result};
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::fmt;
use zeroize::Zeroizing;

/// Protection level a key was created under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTier {
    /// Key material lives in dedicated secure hardware (TEE, StrongBox,
    /// Secure Enclave)
    HardwareBacked,
    /// Software keystore with randomized encryption, usable while the
    /// device is locked
    SoftwareBacked,
    /// Bare key with no platform hardening, the last resort
    Minimal,
}

impl KeyTier {
    /// Attempt order for provisioning, strongest first.
    pub fn fallback_chain() -> [KeyTier; 3] {
        [
            KeyTier::HardwareBacked,
            KeyTier::SoftwareBacked,
            KeyTier::Minimal,
        ]
    }

    /// Stable string form for logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyTier::HardwareBacked => "hardware_backed",
            KeyTier::SoftwareBacked => "software_backed",
            KeyTier::Minimal => "minimal",
        }
    }

    /// Whether the reported capabilities can satisfy this tier.
    pub fn available(&self, caps: &KeyStoreCapabilities) -> bool {
        match self {
            KeyTier::HardwareBacked => caps.has_secure_hardware,
            KeyTier::SoftwareBacked => caps.supports_randomized_encryption,
            KeyTier::Minimal => true,
        }
    }
}

impl fmt::Display for KeyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creation parameters for one tier attempt.
#[derive(Debug, Clone)]
pub struct KeySpec {
    /// Requested protection level
    pub tier: KeyTier,
    /// Require a fresh random IV per encryption (no deterministic mode)
    pub randomized_encryption: bool,
    /// Key must stay usable while the device is locked
    pub lock_independent: bool,
}

impl KeySpec {
    /// Parameters the provisioning chain uses for each tier.
    pub fn for_tier(tier: KeyTier) -> Self {
        match tier {
            KeyTier::HardwareBacked => Self {
                tier,
                randomized_encryption: true,
                lock_independent: false,
            },
            KeyTier::SoftwareBacked => Self {
                tier,
                randomized_encryption: true,
                lock_independent: true,
            },
            KeyTier::Minimal => Self {
                tier,
                randomized_encryption: false,
                lock_independent: true,
            },
        }
    }
}

/// Platform capabilities for key storage
#[derive(Debug, Clone)]
pub struct KeyStoreCapabilities {
    /// Has hardware-backed key storage (TEE, StrongBox, Secure Enclave)
    pub has_secure_hardware: bool,
    /// Has StrongBox (Android only)
    pub has_strongbox: bool,
    /// Has Secure Enclave (iOS/macOS only)
    pub has_secure_enclave: bool,
    /// Software keystore can create randomized-encryption keys
    pub supports_randomized_encryption: bool,
    /// Platform name
    pub platform: Platform,
}

impl Default for KeyStoreCapabilities {
    fn default() -> Self {
        Self {
            has_secure_hardware: false,
            has_strongbox: false,
            has_secure_enclave: false,
            supports_randomized_encryption: false,
            platform: Platform::Unknown,
        }
    }
}

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Android (Keystore, StrongBox)
    Android,
    /// iOS (Keychain, Secure Enclave)
    Ios,
    /// macOS (Keychain, Secure Enclave)
    MacOs,
    /// Windows (DPAPI)
    Windows,
    /// Linux (libsecret)
    Linux,
    /// Unknown platform
    Unknown,
}

impl Platform {
    /// Detect current platform at runtime
    pub fn current() -> Self {
        #[cfg(target_os = "android")]
        return Platform::Android;

        #[cfg(target_os = "ios")]
        return Platform::Ios;

        #[cfg(target_os = "macos")]
        return Platform::MacOs;

        #[cfg(target_os = "windows")]
        return Platform::Windows;

        #[cfg(target_os = "linux")]
        return Platform::Linux;

        #[cfg(not(any(
            target_os = "android",
            target_os = "ios",
            target_os = "macos",
            target_os = "windows",
            target_os = "linux"
        )))]
        return Platform::Unknown;
    }
}

/// Symmetric key handed back by a key store.
///
/// Length is not validated here: damaged platform entries surface as
/// unusable material and are caught by the cipher's round-trip self-test.
#[derive(Clone)]
pub struct KeyMaterial {
    name: String,
    tier: KeyTier,
    key: Zeroizing<Vec<u8>>,
}

impl KeyMaterial {
    /// Expected key length in bytes (AES-256).
    pub const KEY_LEN: usize = 32;

    /// Generate fresh random material for a tier.
    pub fn generate(name: String, tier: KeyTier) -> Self {
        let mut bytes = vec![0u8; Self::KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self {
            name,
            tier,
            key: Zeroizing::new(bytes),
        }
    }

    /// Wrap bytes returned by a platform store.
    pub fn from_bytes(name: String, tier: KeyTier, bytes: &[u8]) -> Self {
        Self {
            name,
            tier,
            key: Zeroizing::new(bytes.to_vec()),
        }
    }

    /// Key name within the platform store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tier the key was created under.
    pub fn tier(&self) -> KeyTier {
        self.tier
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Platform key-store abstraction
///
/// This trait defines the interface for platform-specific key operations.
/// Native implementations bridge to Keystore/Keychain/DPAPI/libsecret; the
/// mock below covers tests and platforms without an integration.
pub trait PlatformKeyStore: Send + Sync {
    /// Get platform capabilities
    fn capabilities(&self) -> KeyStoreCapabilities;

    /// Create a key under `name` with the given parameters.
    ///
    /// A tier the capabilities cannot satisfy must fail here rather than
    /// silently downgrade; the provisioning chain owns the fallback.
    fn create_key(&self, name: &str, spec: &KeySpec) -> Result<KeyMaterial>;

    /// Load an existing key, `None` when absent.
    fn load_key(&self, name: &str) -> Result<Option<KeyMaterial>>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete_key(&self, name: &str) -> Result<()>;
}

/// Mock key store for testing and platforms without native integration
pub struct MockKeyStore {
    capabilities: KeyStoreCapabilities,
    keys: RwLock<HashMap<String, (KeyTier, Vec<u8>)>>,
    failing_tiers: RwLock<HashSet<KeyTier>>,
}

impl MockKeyStore {
    /// Create new mock key store with no advertised hardware.
    pub fn new() -> Self {
        Self {
            capabilities: KeyStoreCapabilities {
                has_secure_hardware: false,
                has_strongbox: false,
                has_secure_enclave: false,
                supports_randomized_encryption: true,
                platform: Platform::current(),
            },
            keys: RwLock::new(HashMap::new()),
            failing_tiers: RwLock::new(HashSet::new()),
        }
    }

    /// Create with custom capabilities (for testing)
    pub fn with_capabilities(capabilities: KeyStoreCapabilities) -> Self {
        Self {
            capabilities,
            keys: RwLock::new(HashMap::new()),
            failing_tiers: RwLock::new(HashSet::new()),
        }
    }

    /// Make `create_key` fail for a tier even when the capabilities allow
    /// it, mimicking quota and attestation failures seen in the field.
    pub fn fail_tier(&self, tier: KeyTier) {
        self.failing_tiers.write().insert(tier);
    }

    /// Stop failing a tier.
    pub fn restore_tier(&self, tier: KeyTier) {
        self.failing_tiers.write().remove(&tier);
    }

    /// Truncate stored material so the next load yields an unusable key,
    /// mimicking a platform entry invalidated behind our back.
    pub fn break_key(&self, name: &str) {
        if let Some((_, bytes)) = self.keys.write().get_mut(name) {
            bytes.truncate(bytes.len() / 2);
        }
    }

    /// Number of keys currently held.
    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }
}

impl Default for MockKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformKeyStore for MockKeyStore {
    fn capabilities(&self) -> KeyStoreCapabilities {
        self.capabilities.clone()
    }

    fn create_key(&self, name: &str, spec: &KeySpec) -> Result<KeyMaterial> {
        if self.failing_tiers.read().contains(&spec.tier) {
            return Err(Error::KeyStore(format!(
                "simulated {} creation failure",
                spec.tier
            )));
        }
        if !spec.tier.available(&self.capabilities) {
            return Err(Error::KeyStore(format!(
                "tier {} not supported on this device",
                spec.tier
            )));
        }

        let material = KeyMaterial::generate(name.to_string(), spec.tier);
        self.keys.write().insert(
            name.to_string(),
            (spec.tier, material.as_bytes().to_vec()),
        );
        Ok(material)
    }

    fn load_key(&self, name: &str) -> Result<Option<KeyMaterial>> {
        Ok(self
            .keys
            .read()
            .get(name)
            .map(|(tier, bytes)| KeyMaterial::from_bytes(name.to_string(), *tier, bytes)))
    }

    fn delete_key(&self, name: &str) -> Result<()> {
        self.keys.write().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_hardware_caps() -> KeyStoreCapabilities {
        KeyStoreCapabilities {
            has_secure_hardware: true,
            has_strongbox: true,
            has_secure_enclave: false,
            supports_randomized_encryption: true,
            platform: Platform::Android,
        }
    }

    #[test]
    fn test_platform_detection() {
        let platform = Platform::current();
        assert!(matches!(
            platform,
            Platform::Android
                | Platform::Ios
                | Platform::MacOs
                | Platform::Windows
                | Platform::Linux
                | Platform::Unknown
        ));
    }

    #[test]
    fn test_tier_availability_follows_capabilities() {
        let none = KeyStoreCapabilities::default();
        assert!(!KeyTier::HardwareBacked.available(&none));
        assert!(!KeyTier::SoftwareBacked.available(&none));
        assert!(KeyTier::Minimal.available(&none));

        let full = full_hardware_caps();
        assert!(KeyTier::HardwareBacked.available(&full));
        assert!(KeyTier::SoftwareBacked.available(&full));
    }

    #[test]
    fn test_mock_create_load_roundtrip() {
        let store = MockKeyStore::with_capabilities(full_hardware_caps());
        let spec = KeySpec::for_tier(KeyTier::HardwareBacked);
        let created = store.create_key("app_secret", &spec).unwrap();

        let loaded = store.load_key("app_secret").unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), created.as_bytes());
        assert_eq!(loaded.tier(), KeyTier::HardwareBacked);
        assert_eq!(loaded.name(), "app_secret");
    }

    #[test]
    fn test_mock_rejects_unavailable_tier() {
        let store = MockKeyStore::new();
        let spec = KeySpec::for_tier(KeyTier::HardwareBacked);
        assert!(store.create_key("app_secret", &spec).is_err());
        assert!(store.load_key("app_secret").unwrap().is_none());
    }

    #[test]
    fn test_mock_fail_tier_switch() {
        let store = MockKeyStore::with_capabilities(full_hardware_caps());
        store.fail_tier(KeyTier::HardwareBacked);

        let spec = KeySpec::for_tier(KeyTier::HardwareBacked);
        assert!(store.create_key("app_secret", &spec).is_err());

        store.restore_tier(KeyTier::HardwareBacked);
        assert!(store.create_key("app_secret", &spec).is_ok());
    }

    #[test]
    fn test_delete_absent_key_is_ok() {
        let store = MockKeyStore::new();
        assert!(store.delete_key("missing").is_ok());
    }

    #[test]
    fn test_break_key_truncates_material() {
        let store = MockKeyStore::new();
        let spec = KeySpec::for_tier(KeyTier::SoftwareBacked);
        store.create_key("app_secret", &spec).unwrap();

        store.break_key("app_secret");
        let broken = store.load_key("app_secret").unwrap().unwrap();
        assert_ne!(broken.as_bytes().len(), KeyMaterial::KEY_LEN);
    }

    #[test]
    fn test_key_material_debug_redacts_bytes() {
        let material = KeyMaterial::generate("app_secret".to_string(), KeyTier::Minimal);
        let rendered = format!("{:?}", material);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("key: ["));
    }
}
