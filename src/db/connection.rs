use std::fmt;
use std::fs;

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::{map_store_error, CatalogError, Result, StoreContext};

const TARGET: &str = "library_catalog.store";

/// Table definitions, created in dependency order. Every statement is
/// idempotent so opening an existing database is a no-op.
const SCHEMA: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL
        )",
    ),
    (
        "genres",
        "CREATE TABLE IF NOT EXISTS genres (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL UNIQUE
        )",
    ),
    (
        "authors",
        "CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL UNIQUE
        )",
    ),
    (
        "user_genre_links",
        "CREATE TABLE IF NOT EXISTS user_genre_links (
            user_id INTEGER NOT NULL,
            genre_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, genre_id),
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(genre_id) REFERENCES genres(id)
        )",
    ),
    (
        "user_author_links",
        "CREATE TABLE IF NOT EXISTS user_author_links (
            user_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, author_id),
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(author_id) REFERENCES authors(id)
        )",
    ),
    (
        "books",
        "CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            author_id INTEGER NOT NULL,
            genre_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            FOREIGN KEY(author_id) REFERENCES authors(id),
            FOREIGN KEY(genre_id) REFERENCES genres(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
    ),
    (
        "books_user_index",
        "CREATE INDEX IF NOT EXISTS books_user_id ON books(user_id)",
    ),
];

/// Handle to the catalogue database. Every persistence helper takes a
/// `&Catalog`; there is no ambient connection.
pub struct Catalog {
    conn: Option<Connection>,
    config: StoreConfig,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.config.db_path)
            .field("open", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open (or create) the database described by `config`, enable foreign
    /// keys and make sure every table exists.
    pub fn connect(config: StoreConfig) -> Result<Self> {
        tracing::debug!(
            target: TARGET,
            path = %config.db_path.display(),
            busy_timeout_ms = config.busy_timeout_ms,
            "opening catalog store"
        );

        if !config.is_in_memory() {
            if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|err| CatalogError::StoreUnavailable {
                    context: format!("failed to create data directory {}", parent.display()),
                    source: Some(Box::new(err)),
                })?;
            }
        }

        let conn = Connection::open(&config.db_path)
            .store_context("failed to open SQLite database")?;
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .store_context("failed to enable foreign keys")?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .store_context("failed to set busy timeout")?;

        ensure_schema(&conn)?;
        tracing::debug!(target: TARGET, "catalog schema ready");

        Ok(Self {
            conn: Some(conn),
            config,
        })
    }

    /// Catalogue in a private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::connect(StoreConfig::in_memory())
    }

    /// Settings the catalogue was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// True once `close` has released the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// The live connection, or `StoreUnavailable` once `close` has run.
    pub(crate) fn connection(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| CatalogError::unavailable("catalog connection is closed"))
    }

    /// Whether an explicit session opened with `begin` is still pending.
    pub fn in_session(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| !conn.is_autocommit())
    }

    /// Start an explicit session so several operations can be committed or
    /// discarded together. Calling it while a session is open does nothing.
    pub fn begin(&self) -> Result<()> {
        let conn = self.connection()?;
        if !conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("BEGIN")
            .store_context("failed to begin session")?;
        tracing::trace!(target: TARGET, "session started");
        Ok(())
    }

    /// Flush the pending session. On a constraint failure the session stays
    /// open and the caller is expected to `rollback`.
    pub fn commit(&self) -> Result<()> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("COMMIT")
            .store_context("failed to commit session")?;
        tracing::trace!(target: TARGET, "session committed");
        Ok(())
    }

    /// Discard every write made since `begin`. Without an open session this
    /// does nothing.
    pub fn rollback(&self) -> Result<()> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("ROLLBACK")
            .store_context("failed to roll back session")?;
        tracing::debug!(target: TARGET, "session rolled back");
        Ok(())
    }

    /// Release the connection. Uncommitted session writes are discarded.
    /// Calling it again is harmless.
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if !conn.is_autocommit() {
            tracing::warn!(target: TARGET, "closing catalog with an open session; discarding it");
            if let Err(error) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(target: TARGET, %error, "failed to discard open session");
            }
        }
        conn.close()
            .map_err(|(_, err)| map_store_error(err, "failed to close SQLite database"))?;
        tracing::debug!(target: TARGET, "catalog store closed");
        Ok(())
    }

    /// Run `f` atomically. A savepoint is used so the work nests inside an
    /// explicit session when one is open and forms its own transaction
    /// otherwise.
    pub(crate) fn write<F, T>(&self, label: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connection()?;
        tracing::trace!(target: TARGET, label, "starting write");

        conn.execute_batch("SAVEPOINT catalog_write")
            .store_context("failed to open savepoint")?;

        match f(conn) {
            Ok(value) => {
                if let Err(err) = conn.execute_batch("RELEASE catalog_write") {
                    discard_savepoint(conn, label);
                    return Err(map_store_error(err, "failed to release savepoint"));
                }
                tracing::trace!(target: TARGET, label, "write committed");
                Ok(value)
            }
            Err(err) => {
                discard_savepoint(conn, label);
                tracing::debug!(target: TARGET, label, error = %err, "write rolled back");
                Err(err)
            }
        }
    }
}

/// Undo and close the `catalog_write` savepoint. Failures are logged rather
/// than returned so the error that triggered the rollback reaches the caller.
fn discard_savepoint(conn: &Connection, label: &'static str) -> bool {
    match conn.execute_batch("ROLLBACK TO catalog_write; RELEASE catalog_write") {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(target: TARGET, label, %error, "failed to roll back savepoint");
            false
        }
    }
}

/// Create every table that does not exist yet.
fn ensure_schema(conn: &Connection) -> Result<()> {
    for (name, sql) in SCHEMA {
        conn.execute(sql, [])
            .map_err(|err| map_store_error(err, &format!("failed to create {name}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::params;

    use super::*;

    fn count_genres(catalog: &Catalog) -> i64 {
        catalog
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM genres", [], |row| row.get(0))
            .unwrap()
    }

    fn insert_genre(conn: &Connection, title: &str) -> Result<()> {
        conn.execute("INSERT INTO genres (title) VALUES (?1)", params![title])
            .store_context("insert genre")?;
        Ok(())
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let catalog = Catalog::open_in_memory().expect("open");
        ensure_schema(catalog.connection().unwrap()).expect("second bootstrap");
        let tables: i64 = catalog
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn failed_write_rolls_back_every_step() {
        let catalog = Catalog::open_in_memory().unwrap();
        let err = catalog
            .write("test", |conn| {
                insert_genre(conn, "horror")?;
                insert_genre(conn, "horror")
            })
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(count_genres(&catalog), 0);
    }

    #[test]
    fn session_rollback_discards_committed_writes() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.begin().unwrap();
        assert!(catalog.in_session());
        catalog.write("test", |conn| insert_genre(conn, "poetry")).unwrap();
        assert_eq!(count_genres(&catalog), 1);
        catalog.rollback().unwrap();
        assert!(!catalog.in_session());
        assert_eq!(count_genres(&catalog), 0);
    }

    #[test]
    fn session_commit_persists_writes() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.begin().unwrap();
        catalog.write("test", |conn| insert_genre(conn, "drama")).unwrap();
        catalog.commit().unwrap();
        catalog.rollback().unwrap();
        assert_eq!(count_genres(&catalog), 1);
    }

    #[test]
    fn commit_and_rollback_without_session_are_noops() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.commit().unwrap();
        catalog.rollback().unwrap();
    }

    #[test]
    fn discarding_without_a_savepoint_reports_failure() {
        let catalog = Catalog::open_in_memory().unwrap();
        let conn = catalog.connection().unwrap();
        assert!(!discard_savepoint(conn, "test"));

        conn.execute_batch("SAVEPOINT catalog_write").unwrap();
        insert_genre(conn, "satire").unwrap();
        assert!(discard_savepoint(conn, "test"));
        assert!(conn.is_autocommit());
        assert_eq!(count_genres(&catalog), 0);
    }

    #[test]
    fn close_twice_is_safe_and_later_use_fails() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.close().unwrap();
        catalog.close().unwrap();
        assert!(catalog.is_closed());
        let err = catalog.begin().unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable { .. }));
    }
}
