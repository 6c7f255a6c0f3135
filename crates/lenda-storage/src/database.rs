//! Database connection and initialization

use crate::{migrations, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Database connection wrapper
///
/// One connection behind a mutex; SQLite serializes writers anyway and the
/// stores' statements are short. Replace-by-key upserts make the last
/// writer for a key win without read-modify-write races.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and bring the schema up to
    /// date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::init(conn)
    }

    /// Open a fresh in-memory database (tests and the demo harness).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with the connection held.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

/// Per-profile database filename under `base_dir`.
///
/// The profile id (installation or account scope) is hashed so filesystem
/// listings leak nothing about the account.
pub fn database_path(base_dir: &Path, profile_id: &str) -> PathBuf {
    let digest = Sha256::digest(profile_id.as_bytes());
    base_dir.join(format!("lenda_{}.db", hex::encode(&digest[..8])))
}

/// Default data directory for the current platform.
pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("com", "lenda", "lenda")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| crate::Error::Storage("No data directory available".to_string()))
}
