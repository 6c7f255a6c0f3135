//! Error types

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Platform key-store error
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error (generic)
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for lenda_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Encryption(msg) => lenda_core::Error::Crypto(msg),
            Error::KeyStore(msg) => lenda_core::Error::Crypto(msg),
            other => lenda_core::Error::Unknown(other.to_string()),
        }
    }
}
