//! User registration and login lookup. Passwords are stored as Argon2id
//! PHC strings with a random per-user salt.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rusqlite::{params, OptionalExtension};

use super::connection::Catalog;
use crate::config::StoreConfig;
use crate::error::{map_store_error, CatalogError, Result, StoreContext};

const TARGET: &str = "library_catalog.accounts";
const SALT_LEN: usize = 16;

/// Register a new user and return its id.
pub fn create_user(catalog: &Catalog, username: &str, password: &str) -> Result<i64> {
    if username.trim().is_empty() {
        return Err(CatalogError::InvalidInput("username cannot be empty"));
    }
    if password.is_empty() {
        return Err(CatalogError::InvalidInput("password cannot be empty"));
    }

    let password_hash = hash_password(password, catalog.config())?;
    catalog.write("create user", |conn| {
        let taken = conn
            .query_row("SELECT 1 FROM users WHERE username = ?1", [username], |_| Ok(()))
            .optional()
            .store_context("failed to look up username")?
            .is_some();
        if taken {
            return Err(CatalogError::UsernameTaken(username.to_string()));
        }

        conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params![username, password_hash],
        )
        .map_err(|err| match map_store_error(err, "failed to insert user") {
            CatalogError::ConstraintViolation(_) => CatalogError::UsernameTaken(username.to_string()),
            other => other,
        })?;

        let id = conn.last_insert_rowid();
        tracing::debug!(target: TARGET, id, username, "registered user");
        Ok(id)
    })
}

/// Id of the user with these credentials. A wrong password and an unknown
/// username are reported the same way.
pub fn find_user_by_credentials(catalog: &Catalog, username: &str, password: &str) -> Result<i64> {
    let conn = catalog.connection()?;
    let record: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            [username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .store_context("failed to look up user")?;

    match record {
        Some((id, stored)) if verify_password(password, &stored) => Ok(id),
        _ => {
            tracing::debug!(target: TARGET, username, "login rejected");
            Err(CatalogError::NotFound { what: "user" })
        }
    }
}

/// Display name of `user_id`, or `NotFound` for an unknown id.
pub fn username(catalog: &Catalog, user_id: i64) -> Result<String> {
    let conn = catalog.connection()?;
    conn.query_row("SELECT username FROM users WHERE id = ?1", [user_id], |row| row.get(0))
        .optional()
        .store_context("failed to load username")?
        .ok_or(CatalogError::NotFound { what: "user" })
}

/// Hash `password` into a PHC string (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
fn hash_password(password: &str, config: &StoreConfig) -> Result<String> {
    let params = Params::new(
        config.password_memory_kib,
        config.password_passes,
        Params::DEFAULT_P_COST,
        None,
    )
    .map_err(|_| CatalogError::InvalidInput("invalid password hashing parameters"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut salt = [0_u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|_| CatalogError::InvalidInput("password salt could not be encoded"))?;

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| CatalogError::InvalidInput("password could not be hashed"))
}

/// Check `password` against a stored PHC string. The cost parameters come
/// from the stored hash, so changing the configuration keeps old logins valid.
fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}
