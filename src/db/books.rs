use rusqlite::{params, Connection, OptionalExtension};

use super::connection::Catalog;
use super::dictionary::link_exists;
use crate::error::{CatalogError, Result, StoreContext};
use crate::models::{normalize_title, BookDetails, BookFilters, BookRow, DictionaryKind, SortKey};

const TARGET: &str = "library_catalog.books";

/// Search the user's books. Every filter in `filters` that is set narrows the
/// result; title is a substring match, author and genre must match exactly
/// (ignoring case) and status must match exactly.
pub fn search_books(
    catalog: &Catalog,
    user_id: i64,
    filters: &BookFilters,
    sort: SortKey,
) -> Result<Vec<BookRow>> {
    let conn = catalog.connection()?;
    let sql = format!(
        "SELECT b.id, b.title, a.title, g.title, b.status
         FROM books b
         INNER JOIN authors a ON a.id = b.author_id
         INNER JOIN genres g ON g.id = b.genre_id
         WHERE b.user_id = ?1
           AND (?2 IS NULL OR instr(b.title, ?2) > 0)
           AND (?3 IS NULL OR a.title = ?3)
           AND (?4 IS NULL OR g.title = ?4)
           AND (?5 IS NULL OR b.status = ?5)
         ORDER BY {}",
        sort.order_by()
    );
    let mut stmt = conn
        .prepare(&sql)
        .store_context("failed to prepare book search")?;

    let books = stmt
        .query_map(
            params![
                user_id,
                filters.title.as_deref().map(normalize_title),
                filters.author.as_deref().map(normalize_title),
                filters.genre.as_deref().map(normalize_title),
                filters.status.as_deref(),
            ],
            |row| {
                Ok(BookRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    genre: row.get(3)?,
                    status: row.get(4)?,
                })
            },
        )
        .store_context("failed to search books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .store_context("failed to collect books")?;

    Ok(books)
}

/// Full details of book `id` with author and genre titles resolved.
/// `NotFound` when no book has that id.
pub fn get_book(catalog: &Catalog, id: i64) -> Result<BookDetails> {
    let conn = catalog.connection()?;
    conn.query_row(
        "SELECT b.title, a.title, g.title, b.status
         FROM books b
         INNER JOIN authors a ON a.id = b.author_id
         INNER JOIN genres g ON g.id = b.genre_id
         WHERE b.id = ?1",
        [id],
        |row| {
            Ok(BookDetails {
                title: row.get(0)?,
                author: row.get(1)?,
                genre: row.get(2)?,
                status: row.get(3)?,
            })
        },
    )
    .optional()
    .store_context("failed to load book")?
    .ok_or(CatalogError::NotFound { what: "book" })
}

/// Insert a book for the user. Duplicate titles are allowed. The author and
/// genre must already be part of the user's vocabulary.
pub fn add_book(
    catalog: &Catalog,
    user_id: i64,
    title: &str,
    author_id: i64,
    genre_id: i64,
    status: &str,
) -> Result<i64> {
    catalog.write("add book", |conn| {
        insert_book_in(conn, user_id, title, author_id, genre_id, status)
    })
}

/// Overwrite every field of an existing book.
pub fn edit_book(
    catalog: &Catalog,
    id: i64,
    title: &str,
    author_id: i64,
    genre_id: i64,
    status: &str,
) -> Result<()> {
    catalog.write("edit book", |conn| {
        let user_id: i64 = conn
            .query_row("SELECT user_id FROM books WHERE id = ?1", [id], |row| row.get(0))
            .optional()
            .store_context("failed to look up book owner")?
            .ok_or(CatalogError::NotFound { what: "book" })?;

        let title = checked_title(title)?;
        ensure_linked(conn, user_id, author_id, genre_id)?;

        conn.execute(
            "UPDATE books SET title = ?1, author_id = ?2, genre_id = ?3, status = ?4 WHERE id = ?5",
            params![title, author_id, genre_id, status, id],
        )
        .store_context("failed to update book")?;

        tracing::debug!(target: TARGET, id, user_id, "updated book");
        Ok(())
    })
}

/// Permanently delete a book. Books are leaves, so nothing else is checked.
pub fn delete_book(catalog: &Catalog, id: i64) -> Result<()> {
    let conn = catalog.connection()?;
    let deleted = conn
        .execute("DELETE FROM books WHERE id = ?1", [id])
        .store_context("failed to delete book")?;

    if deleted == 0 {
        return Err(CatalogError::NotFound { what: "book" });
    }
    tracing::debug!(target: TARGET, id, "deleted book");
    Ok(())
}

/// Distinct statuses used by the user's books, for the status filter.
pub fn list_statuses(catalog: &Catalog, user_id: i64) -> Result<Vec<String>> {
    let conn = catalog.connection()?;
    let mut stmt = conn
        .prepare("SELECT DISTINCT status FROM books WHERE user_id = ?1 ORDER BY status")
        .store_context("failed to prepare status query")?;

    let statuses = stmt
        .query_map([user_id], |row| row.get(0))
        .store_context("failed to load statuses")?
        .collect::<rusqlite::Result<Vec<String>>>()
        .store_context("failed to collect statuses")?;

    Ok(statuses)
}

pub(crate) fn insert_book_in(
    conn: &Connection,
    user_id: i64,
    title: &str,
    author_id: i64,
    genre_id: i64,
    status: &str,
) -> Result<i64> {
    let title = checked_title(title)?;
    ensure_linked(conn, user_id, author_id, genre_id)?;

    conn.execute(
        "INSERT INTO books (title, author_id, genre_id, status, user_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![title, author_id, genre_id, status, user_id],
    )
    .store_context("failed to insert book")?;

    let id = conn.last_insert_rowid();
    tracing::debug!(target: TARGET, id, user_id, %title, "inserted book");
    Ok(id)
}

/// Remove every book owned by the user. Returns how many were deleted.
pub(crate) fn delete_user_books_in(conn: &Connection, user_id: i64) -> Result<usize> {
    conn.execute("DELETE FROM books WHERE user_id = ?1", [user_id])
        .store_context("failed to clear books")
}

fn ensure_linked(conn: &Connection, user_id: i64, author_id: i64, genre_id: i64) -> Result<()> {
    if !link_exists(conn, DictionaryKind::Author, user_id, author_id)? {
        return Err(CatalogError::NotFound {
            what: "author in your library",
        });
    }
    if !link_exists(conn, DictionaryKind::Genre, user_id, genre_id)? {
        return Err(CatalogError::NotFound {
            what: "genre in your library",
        });
    }
    Ok(())
}

fn checked_title(title: &str) -> Result<String> {
    let title = normalize_title(title);
    if title.is_empty() {
        return Err(CatalogError::InvalidInput("book title cannot be empty"));
    }
    Ok(title)
}
