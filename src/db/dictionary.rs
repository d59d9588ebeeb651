//! Shared author and genre vocabularies. Entries are global and deduplicated
//! by lower-cased title; each user only sees the entries linked to them.

use rusqlite::{params, Connection, OptionalExtension};

use super::connection::Catalog;
use crate::error::{map_store_error, CatalogError, Result, StoreContext};
use crate::models::{normalize_title, DictionaryEntry, DictionaryKind};

const TARGET: &str = "library_catalog.dictionary";

/// Every entry linked to the user, in the order the links were created.
pub fn list_user_entries(
    catalog: &Catalog,
    kind: DictionaryKind,
    user_id: i64,
) -> Result<Vec<DictionaryEntry>> {
    let conn = catalog.connection()?;
    let sql = format!(
        "SELECT e.id, e.title
         FROM {entries} e
         INNER JOIN {links} l ON l.{id_col} = e.id
         WHERE l.user_id = ?1
         ORDER BY l.rowid",
        entries = kind.entry_table(),
        links = kind.link_table(),
        id_col = kind.id_column(),
    );
    let mut stmt = conn
        .prepare(&sql)
        .store_context("failed to prepare vocabulary query")?;

    let entries = stmt
        .query_map([user_id], |row| {
            Ok(DictionaryEntry {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        })
        .store_context("failed to load vocabulary")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .store_context("failed to collect vocabulary")?;

    Ok(entries)
}

/// Case-insensitive substring search over the user's vocabulary, sorted by
/// title. `None` or an empty query matches everything.
pub fn search_entries(
    catalog: &Catalog,
    kind: DictionaryKind,
    user_id: i64,
    query: Option<&str>,
) -> Result<Vec<DictionaryEntry>> {
    let conn = catalog.connection()?;
    let needle = query.map(normalize_title).unwrap_or_default();
    let sql = format!(
        "SELECT e.id, e.title
         FROM {entries} e
         INNER JOIN {links} l ON l.{id_col} = e.id
         WHERE l.user_id = ?1 AND instr(e.title, ?2) > 0
         ORDER BY e.title, e.id",
        entries = kind.entry_table(),
        links = kind.link_table(),
        id_col = kind.id_column(),
    );
    let mut stmt = conn
        .prepare(&sql)
        .store_context("failed to prepare vocabulary search")?;

    let entries = stmt
        .query_map(params![user_id, needle], |row| {
            Ok(DictionaryEntry {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        })
        .store_context("failed to search vocabulary")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .store_context("failed to collect vocabulary search")?;

    Ok(entries)
}

/// Title of the global entry `id`, whoever it is linked to.
pub fn entry_title(catalog: &Catalog, kind: DictionaryKind, id: i64) -> Result<String> {
    let conn = catalog.connection()?;
    let sql = format!("SELECT title FROM {} WHERE id = ?1", kind.entry_table());
    conn.query_row(&sql, [id], |row| row.get(0))
        .optional()
        .store_context("failed to read entry title")?
        .ok_or(CatalogError::NotFound {
            what: kind.as_str(),
        })
}

/// Add `title` to the user's vocabulary, reusing the global entry when one
/// with the same normalized title exists. Returns the entry id.
pub fn add_entry(catalog: &Catalog, kind: DictionaryKind, user_id: i64, title: &str) -> Result<i64> {
    catalog.write("add dictionary entry", |conn| add_entry_in(conn, kind, user_id, title))
}

/// Rename an entry for one user by pointing their link (and their books) at
/// the entry for `new_title`. The old entry keeps its title for other users.
pub fn edit_entry(
    catalog: &Catalog,
    kind: DictionaryKind,
    user_id: i64,
    entry_id: i64,
    new_title: &str,
) -> Result<i64> {
    catalog.write("edit dictionary entry", |conn| {
        if !link_exists(conn, kind, user_id, entry_id)? {
            return Err(CatalogError::NotFound {
                what: link_label(kind),
            });
        }

        let title = checked_title(kind, new_title)?;
        let new_id = resolve_or_create(conn, kind, &title)?;
        if new_id == entry_id {
            return Ok(entry_id);
        }
        if link_exists(conn, kind, user_id, new_id)? {
            return Err(CatalogError::DuplicateLink {
                kind: kind.as_str(),
                title,
            });
        }

        let id_col = kind.id_column();
        conn.execute(
            &format!(
                "UPDATE {} SET {id_col} = ?1 WHERE user_id = ?2 AND {id_col} = ?3",
                kind.link_table()
            ),
            params![new_id, user_id, entry_id],
        )
        .store_context("failed to retarget vocabulary link")?;
        let books = conn
            .execute(
                &format!("UPDATE books SET {id_col} = ?1 WHERE user_id = ?2 AND {id_col} = ?3"),
                params![new_id, user_id, entry_id],
            )
            .store_context("failed to retarget books")?;

        tracing::debug!(
            target: TARGET,
            kind = kind.as_str(),
            user_id,
            old_id = entry_id,
            new_id,
            books,
            "retargeted vocabulary link"
        );
        Ok(new_id)
    })
}

/// Remove the entry from the user's vocabulary. The global entry survives.
pub fn delete_entry(catalog: &Catalog, kind: DictionaryKind, user_id: i64, entry_id: i64) -> Result<()> {
    catalog.write("delete dictionary entry", |conn| {
        if !link_exists(conn, kind, user_id, entry_id)? {
            return Err(CatalogError::NotFound {
                what: link_label(kind),
            });
        }

        let books: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM books WHERE user_id = ?1 AND {} = ?2",
                    kind.id_column()
                ),
                params![user_id, entry_id],
                |row| row.get(0),
            )
            .store_context("failed to count referencing books")?;
        if books > 0 {
            tracing::warn!(
                target: TARGET,
                kind = kind.as_str(),
                user_id,
                entry_id,
                books,
                "refusing to unlink entry that is still in use"
            );
            return Err(CatalogError::EntryInUse {
                kind: kind.as_str(),
                entry_id,
                books,
            });
        }

        conn.execute(
            &format!(
                "DELETE FROM {} WHERE user_id = ?1 AND {} = ?2",
                kind.link_table(),
                kind.id_column()
            ),
            params![user_id, entry_id],
        )
        .store_context("failed to delete vocabulary link")?;

        tracing::debug!(target: TARGET, kind = kind.as_str(), user_id, entry_id, "unlinked entry");
        Ok(())
    })
}

/// Body of `add_entry`, reusable inside a larger write.
pub(crate) fn add_entry_in(
    conn: &Connection,
    kind: DictionaryKind,
    user_id: i64,
    title: &str,
) -> Result<i64> {
    let title = checked_title(kind, title)?;
    let entry_id = resolve_or_create(conn, kind, &title)?;

    if link_exists(conn, kind, user_id, entry_id)? {
        return Err(CatalogError::DuplicateLink {
            kind: kind.as_str(),
            title,
        });
    }

    let inserted = conn.execute(
        &format!(
            "INSERT INTO {} (user_id, {}) VALUES (?1, ?2)",
            kind.link_table(),
            kind.id_column()
        ),
        params![user_id, entry_id],
    );
    if let Err(err) = inserted {
        let err = map_store_error(err, "failed to link vocabulary entry");
        if !err.is_constraint_violation() {
            return Err(err);
        }
        // Either the link appeared meanwhile or the user row is missing.
        return if link_exists(conn, kind, user_id, entry_id)? {
            Err(CatalogError::DuplicateLink {
                kind: kind.as_str(),
                title,
            })
        } else {
            Err(CatalogError::NotFound { what: "user" })
        };
    }

    tracing::debug!(target: TARGET, kind = kind.as_str(), user_id, entry_id, %title, "linked entry");
    Ok(entry_id)
}

/// Whether the user has `entry_id` in their vocabulary.
pub(crate) fn link_exists(
    conn: &Connection,
    kind: DictionaryKind,
    user_id: i64,
    entry_id: i64,
) -> Result<bool> {
    conn.query_row(
        &format!(
            "SELECT 1 FROM {} WHERE user_id = ?1 AND {} = ?2",
            kind.link_table(),
            kind.id_column()
        ),
        params![user_id, entry_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .store_context("failed to look up vocabulary link")
}

/// Id of the global entry with this normalized title, inserting it when it
/// does not exist. A concurrent insert of the same title loses on the UNIQUE
/// constraint and falls back to a lookup.
fn resolve_or_create(conn: &Connection, kind: DictionaryKind, title: &str) -> Result<i64> {
    match find_entry_id(conn, kind, title)? {
        Some(id) => Ok(id),
        None => insert_or_lookup(conn, kind, title),
    }
}

/// Insert a new global entry. When another writer got there first the unique
/// title constraint fires and the existing id is returned instead.
fn insert_or_lookup(conn: &Connection, kind: DictionaryKind, title: &str) -> Result<i64> {
    match conn.execute(
        &format!("INSERT INTO {} (title) VALUES (?1)", kind.entry_table()),
        [title],
    ) {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            tracing::debug!(target: TARGET, kind = kind.as_str(), id, %title, "created dictionary entry");
            Ok(id)
        }
        Err(err) => {
            let err = map_store_error(err, "failed to insert dictionary entry");
            if !err.is_constraint_violation() {
                return Err(err);
            }
            tracing::warn!(
                target: TARGET,
                kind = kind.as_str(),
                %title,
                "entry created concurrently; retrying as lookup"
            );
            find_entry_id(conn, kind, title)?.ok_or(CatalogError::NotFound {
                what: kind.as_str(),
            })
        }
    }
}

fn find_entry_id(conn: &Connection, kind: DictionaryKind, title: &str) -> Result<Option<i64>> {
    conn.query_row(
        &format!("SELECT id FROM {} WHERE title = ?1", kind.entry_table()),
        [title],
        |row| row.get(0),
    )
    .optional()
    .store_context("failed to look up dictionary entry")
}

fn checked_title(kind: DictionaryKind, title: &str) -> Result<String> {
    let title = normalize_title(title);
    if title.is_empty() {
        return Err(CatalogError::InvalidInput(match kind {
            DictionaryKind::Author => "author name cannot be empty",
            DictionaryKind::Genre => "genre title cannot be empty",
        }));
    }
    Ok(title)
}

const fn link_label(kind: DictionaryKind) -> &'static str {
    match kind {
        DictionaryKind::Author => "author in your library",
        DictionaryKind::Genre => "genre in your library",
    }
}
