//! Security tests for key provisioning, encryption, and corruption recovery
//!
//! Tests cover:
//! - Keystore tier selection and fallback across capability profiles
//! - Key self-test with delete-and-recreate on corruption
//! - Ciphertext-only persistence through the full storage stack
//! - Undecryptable data treated as absent at every layer

use lenda_core::AuthToken;
use lenda_storage::{
    database_path, BlobStore, CacheStore, Database, KeyStoreCapabilities, KeyTier, MockKeyStore,
    Platform, PlatformKeyStore, SecretCipher, SecureKeyValueStore, SessionStore, SqliteBlobStore,
};
use std::sync::Arc;
use tempfile::tempdir;

fn hardware_caps() -> KeyStoreCapabilities {
    KeyStoreCapabilities {
        has_secure_hardware: true,
        has_strongbox: true,
        has_secure_enclave: false,
        supports_randomized_encryption: true,
        platform: Platform::Android,
    }
}

fn software_caps() -> KeyStoreCapabilities {
    KeyStoreCapabilities {
        has_secure_hardware: false,
        has_strongbox: false,
        has_secure_enclave: false,
        supports_randomized_encryption: true,
        platform: Platform::Android,
    }
}

fn minimal_caps() -> KeyStoreCapabilities {
    KeyStoreCapabilities {
        has_secure_hardware: false,
        has_strongbox: false,
        has_secure_enclave: false,
        supports_randomized_encryption: false,
        platform: Platform::Unknown,
    }
}

// =============================================================================
// Tier selection and fallback
// =============================================================================

#[test]
fn test_provision_prefers_hardware_tier() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    let cipher = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(cipher.tier(), KeyTier::HardwareBacked);
}

#[test]
fn test_provision_without_hardware_lands_on_software() {
    let keystore = MockKeyStore::with_capabilities(software_caps());
    let cipher = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(cipher.tier(), KeyTier::SoftwareBacked);
}

#[test]
fn test_provision_falls_back_when_hardware_creation_fails() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    keystore.fail_tier(KeyTier::HardwareBacked);

    let cipher = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(cipher.tier(), KeyTier::SoftwareBacked);
}

#[test]
fn test_provision_minimal_is_last_resort() {
    let keystore = MockKeyStore::with_capabilities(minimal_caps());
    let cipher = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(cipher.tier(), KeyTier::Minimal);
}

#[test]
fn test_provision_fails_when_every_tier_fails() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    keystore.fail_tier(KeyTier::HardwareBacked);
    keystore.fail_tier(KeyTier::SoftwareBacked);
    keystore.fail_tier(KeyTier::Minimal);

    assert!(SecretCipher::provision(&keystore, "lenda.master").is_err());
}

#[test]
fn test_each_tier_round_trips() {
    for (caps, expected) in [
        (hardware_caps(), KeyTier::HardwareBacked),
        (software_caps(), KeyTier::SoftwareBacked),
        (minimal_caps(), KeyTier::Minimal),
    ] {
        let keystore = MockKeyStore::with_capabilities(caps);
        let cipher = SecretCipher::provision(&keystore, "lenda.master").unwrap();
        assert_eq!(cipher.tier(), expected);

        let sealed = cipher.encrypt_str("per-tier probe").unwrap();
        assert_eq!(cipher.decrypt_str(&sealed).unwrap(), "per-tier probe");
    }
}

// =============================================================================
// Key reuse and corruption recovery
// =============================================================================

#[test]
fn test_provision_reuses_existing_key() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());

    let first = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    let sealed = first.encrypt_str("sealed before restart").unwrap();

    // A second provisioning must return the same key, not mint a new one.
    let second = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(keystore.key_count(), 1);
    assert_eq!(
        second.decrypt_str(&sealed).unwrap(),
        "sealed before restart"
    );
}

#[test]
fn test_provision_recreates_key_that_fails_self_test() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());

    let first = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    let sealed = first.encrypt_str("sealed under old key").unwrap();

    keystore.break_key("lenda.master");

    // Provisioning notices the broken key and replaces it.
    let second = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(keystore.key_count(), 1);

    // The replacement key works, and old ciphertext fails closed.
    let resealed = second.encrypt_str("sealed under new key").unwrap();
    assert_eq!(
        second.decrypt_str(&resealed).unwrap(),
        "sealed under new key"
    );
    assert!(second.decrypt_str(&sealed).is_err());
}

#[test]
fn test_tier_can_recover_after_transient_failure() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    keystore.fail_tier(KeyTier::HardwareBacked);

    let degraded = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(degraded.tier(), KeyTier::SoftwareBacked);

    // Once the tier is usable again, a fresh provisioning after the old
    // key is gone upgrades back to hardware.
    keystore.restore_tier(KeyTier::HardwareBacked);
    keystore.delete_key("lenda.master").unwrap();
    let restored = SecretCipher::provision(&keystore, "lenda.master").unwrap();
    assert_eq!(restored.tier(), KeyTier::HardwareBacked);
}

// =============================================================================
// Ciphertext-only persistence
// =============================================================================

#[test]
fn test_session_token_is_ciphertext_on_disk() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master").unwrap());

    let dir = tempdir().unwrap();
    let path = database_path(dir.path(), "profile-1");
    let db = Arc::new(Database::open(&path).unwrap());
    let blobs = Arc::new(SqliteBlobStore::new(db.clone()));
    let sessions = SessionStore::new(SecureKeyValueStore::new(blobs.clone(), cipher));

    let token = AuthToken::new(
        "very-secret-access".to_string(),
        "very-secret-refresh".to_string(),
        "Bearer".to_string(),
        3_600,
        "user-1".to_string(),
    );
    sessions.save_token(&token).unwrap();

    // What the blob layer persisted must not leak the credentials.
    let at_rest = blobs.get("session.auth_token").unwrap().unwrap();
    assert!(!at_rest.contains("very-secret-access"));
    assert!(!at_rest.contains("very-secret-refresh"));
    assert!(!at_rest.contains("user-1"));

    assert_eq!(sessions.token().unwrap(), Some(token));
}

#[test]
fn test_session_survives_database_reopen() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    let dir = tempdir().unwrap();
    let path = database_path(dir.path(), "profile-1");

    let token = AuthToken::new(
        "access".to_string(),
        "refresh".to_string(),
        "Bearer".to_string(),
        3_600,
        "user-1".to_string(),
    );

    {
        let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master").unwrap());
        let db = Arc::new(Database::open(&path).unwrap());
        let blobs = Arc::new(SqliteBlobStore::new(db));
        SessionStore::new(SecureKeyValueStore::new(blobs, cipher))
            .save_token(&token)
            .unwrap();
    }

    // Same key, fresh process: the session restores.
    let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master").unwrap());
    let db = Arc::new(Database::open(&path).unwrap());
    let blobs = Arc::new(SqliteBlobStore::new(db));
    let sessions = SessionStore::new(SecureKeyValueStore::new(blobs, cipher));
    assert_eq!(sessions.token().unwrap(), Some(token));
}

#[test]
fn test_key_loss_invalidates_stored_session_without_error() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    let dir = tempdir().unwrap();
    let path = database_path(dir.path(), "profile-1");

    {
        let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master").unwrap());
        let db = Arc::new(Database::open(&path).unwrap());
        let blobs = Arc::new(SqliteBlobStore::new(db));
        let token = AuthToken::new(
            "access".to_string(),
            "refresh".to_string(),
            "Bearer".to_string(),
            3_600,
            "user-1".to_string(),
        );
        SessionStore::new(SecureKeyValueStore::new(blobs, cipher))
            .save_token(&token)
            .unwrap();
    }

    // Device wipe of the keystore: the data is unreadable but the app
    // must land on "signed out", not an error.
    keystore.delete_key("lenda.master").unwrap();
    let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master").unwrap());
    let db = Arc::new(Database::open(&path).unwrap());
    let blobs = Arc::new(SqliteBlobStore::new(db.clone()));
    let sessions = SessionStore::new(SecureKeyValueStore::new(blobs.clone(), cipher));

    assert_eq!(sessions.token().unwrap(), None);
    assert!(!sessions.is_valid().unwrap());
    // The stale entry was removed, not left behind.
    assert!(!blobs.contains("session.auth_token").unwrap());
}

#[test]
fn test_cache_rows_unreadable_after_key_rotation() {
    let keystore = MockKeyStore::with_capabilities(hardware_caps());
    let db = Arc::new(Database::open_in_memory().unwrap());

    {
        let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master").unwrap());
        let cache = CacheStore::new(db.clone(), cipher);
        cache.put("loans:user-1", "[\"loan\"]", 1_000).unwrap();
    }

    keystore.delete_key("lenda.master").unwrap();
    let cipher = Arc::new(SecretCipher::provision(&keystore, "lenda.master").unwrap());
    let cache = CacheStore::new(db, cipher);

    // Old rows decrypt under the old key only; they come back absent.
    assert_eq!(cache.get("loans:user-1").unwrap(), None);
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_diagnostics_report_tier_and_fingerprint() {
    let caps = hardware_caps();
    let keystore = MockKeyStore::with_capabilities(caps.clone());
    let cipher = SecretCipher::provision(&keystore, "lenda.master").unwrap();

    let diag = cipher.diagnostics(&caps);
    assert_eq!(diag.tier, KeyTier::HardwareBacked);
    assert_eq!(diag.platform, Platform::Android);
    assert!(diag.has_secure_hardware);
    assert!(diag.self_test_passed);
    // Fingerprint identifies the key name without revealing it.
    assert_eq!(diag.key_fingerprint.len(), 8);
    assert!(!diag.key_fingerprint.contains("lenda"));
}
