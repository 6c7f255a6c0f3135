//! Encrypted SQLite storage for the Lenda client
//!
//! Provides the device-local database with WAL mode and migrations, plus
//! the encrypted stores layered on top of it: session token, profile,
//! resource cache, drafts, and preferences.
//!
//! ## Security Features
//!
//! - **Field Encryption**: AES-256-GCM on every stored payload
//! - **Key Provisioning**: platform keystore tiers with graceful fallback
//!   (hardware-backed, software-backed, minimal)
//! - **Key Self-Test**: round-trip probe before a key is trusted, with
//!   delete-and-recreate on failure
//! - **Corruption Handling**: undecryptable rows are dropped, never served

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod blob_store;
pub mod cache;
pub mod cipher;
pub mod database;
pub mod drafts;
pub mod error;
pub mod keystore;
pub mod migrations;
pub mod preferences;
pub mod profile;
pub mod secure_kv;
pub mod session;

pub use blob_store::{BlobStore, MemoryBlobStore, SqliteBlobStore};
pub use cache::{CacheRow, CacheStore};
pub use cipher::{SecretBlob, SecretCipher, SecurityDiagnostics};
pub use database::{database_path, default_data_dir, Database};
pub use drafts::DraftStore;
pub use error::{Error, Result};
pub use keystore::{
    KeyMaterial, KeySpec, KeyStoreCapabilities, KeyTier, MockKeyStore, Platform, PlatformKeyStore,
};
pub use migrations::SCHEMA_VERSION;
pub use preferences::Preferences;
pub use profile::ProfileCache;
pub use secure_kv::SecureKeyValueStore;
pub use session::SessionStore;
