use std::env;
use std::path::{Path, PathBuf};

use argon2::Params;
use directories::BaseDirs;

use crate::error::{CatalogError, Result};

/// Folder holding the database next to the installed binary.
const INSTALL_DATA_DIR: &str = "database";
/// Folder name used beneath the user's home directory for application data.
const HOME_DATA_DIR: &str = ".library-catalog";
/// SQLite file name stored inside either data directory.
const DB_FILE_NAME: &str = "books_db.sqlite";
/// Special path understood by SQLite as a private in-memory database.
const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where the catalogue lives and how the store and password hashing behave.
pub struct StoreConfig {
    /// SQLite file, or `:memory:` for a private in-memory database.
    pub db_path: PathBuf,
    /// How long a connection waits on a lock held by another session.
    pub busy_timeout_ms: u64,
    /// Argon2 memory cost in KiB for new password hashes.
    pub password_memory_kib: u32,
    /// Argon2 time cost (passes over memory) for new password hashes.
    pub password_passes: u32,
}

impl StoreConfig {
    /// Private in-memory database that disappears when the `Catalog` closes.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(IN_MEMORY),
            ..Self::default()
        }
    }

    /// Default settings with the database at `path`. Missing parent
    /// directories are created on connect.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            ..Self::default()
        }
    }

    /// Place the database under the user's home directory instead of the
    /// installation directory, for installs where the latter is read-only.
    pub fn in_home_dir() -> Result<Self> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| CatalogError::unavailable("could not locate home directory"))?;
        Ok(Self::with_path(
            base_dirs.home_dir().join(HOME_DATA_DIR).join(DB_FILE_NAME),
        ))
    }

    /// True when `db_path` names the private in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.db_path == Path::new(IN_MEMORY)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: install_db_path(),
            busy_timeout_ms: 5_000,
            password_memory_kib: Params::DEFAULT_M_COST,
            password_passes: Params::DEFAULT_T_COST,
        }
    }
}

/// `<dir of the running executable>/database/books_db.sqlite`, falling back to
/// a path relative to the working directory when the executable is unknown.
fn install_db_path() -> PathBuf {
    let base = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    base.join(INSTALL_DATA_DIR).join(DB_FILE_NAME)
}
