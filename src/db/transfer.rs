//! CSV export and the destructive bulk import.
//!
//! Import wipes the user's books and vocabulary links *before* the new data
//! is read. The wipe is committed on its own, so a malformed file leaves the
//! user with an empty catalogue and an `ImportError`. The rows themselves are
//! inserted in a single write, so a failure never leaves a partial import.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use rusqlite::Connection;

use super::books::{delete_user_books_in, insert_book_in};
use super::connection::Catalog;
use super::dictionary::add_entry_in;
use crate::error::{CatalogError, Result, StoreContext};
use crate::models::{normalize_title, CsvRecord, DictionaryKind};

const TARGET: &str = "library_catalog.transfer";

/// Header row of every exported file.
pub const CSV_HEADER: [&str; 4] = ["Book", "Author", "Genre", "Status"];

/// The user's books as flat records, in the order they were added.
pub fn export_records(catalog: &Catalog, user_id: i64) -> Result<Vec<CsvRecord>> {
    let conn = catalog.connection()?;
    let mut stmt = conn
        .prepare(
            "SELECT b.title, a.title, g.title, b.status
             FROM books b
             INNER JOIN authors a ON a.id = b.author_id
             INNER JOIN genres g ON g.id = b.genre_id
             WHERE b.user_id = ?1
             ORDER BY b.id",
        )
        .store_context("failed to prepare export query")?;

    let records = stmt
        .query_map([user_id], |row| {
            Ok(CsvRecord {
                book: row.get(0)?,
                author: row.get(1)?,
                genre: row.get(2)?,
                status: row.get(3)?,
            })
        })
        .store_context("failed to export books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .store_context("failed to collect exported books")?;

    Ok(records)
}

/// Write the user's books as CSV, header first. Returns the number of rows.
pub fn write_csv<W: Write>(catalog: &Catalog, user_id: i64, writer: W) -> Result<usize> {
    let records = export_records(catalog, user_id)?;
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    csv_writer.write_record(CSV_HEADER).map_err(csv_write_error)?;
    for record in &records {
        csv_writer.serialize(record).map_err(csv_write_error)?;
    }
    csv_writer.flush().map_err(|err| CatalogError::StoreUnavailable {
        context: "failed to flush CSV output".to_string(),
        source: Some(Box::new(err)),
    })?;

    tracing::debug!(target: TARGET, user_id, rows = records.len(), "exported catalogue");
    Ok(records.len())
}

/// Write the user's catalogue as CSV to `path`, creating or truncating the
/// file. Returns the number of books written.
pub fn export_to_path(catalog: &Catalog, user_id: i64, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| CatalogError::StoreUnavailable {
        context: format!("failed to create {}", path.display()),
        source: Some(Box::new(err)),
    })?;
    write_csv(catalog, user_id, file)
}

/// Remove all of the user's books and vocabulary links. Shared dictionary
/// entries are left in place for other users.
pub fn clear_user_catalog(catalog: &Catalog, user_id: i64) -> Result<()> {
    catalog.write("clear user catalogue", |conn| {
        let books = delete_user_books_in(conn, user_id)?;
        let mut links = 0;
        for kind in [DictionaryKind::Genre, DictionaryKind::Author] {
            links += conn
                .execute(
                    &format!("DELETE FROM {} WHERE user_id = ?1", kind.link_table()),
                    [user_id],
                )
                .store_context("failed to clear vocabulary links")?;
        }
        tracing::debug!(target: TARGET, user_id, books, links, "cleared user catalogue");
        Ok(())
    })
}

/// Replace the user's catalogue with `records`.
pub fn import_records<I>(catalog: &Catalog, user_id: i64, records: I) -> Result<usize>
where
    I: IntoIterator<Item = CsvRecord>,
{
    clear_user_catalog(catalog, user_id)?;
    catalog.write("import records", |conn| {
        let mut importer = Importer::new(conn, user_id);
        for (index, record) in records.into_iter().enumerate() {
            // Header occupies line 1.
            importer.insert(&record, index as u64 + 2)?;
        }
        Ok(importer.finish())
    })
}

/// Replace the user's catalogue with the CSV rows read from `reader`.
/// Header names are trimmed; field values are kept as written so statuses
/// survive verbatim. Titles are normalized on insert.
pub fn read_csv<R: Read>(catalog: &Catalog, user_id: i64, reader: R) -> Result<usize> {
    clear_user_catalog(catalog, user_id)?;

    let mut csv_reader = ReaderBuilder::new().trim(Trim::Headers).from_reader(reader);
    catalog.write("import csv", |conn| {
        let headers = csv_reader.headers().map_err(csv_import_error)?.clone();
        let mut importer = Importer::new(conn, user_id);
        let mut raw = StringRecord::new();

        while csv_reader.read_record(&mut raw).map_err(csv_import_error)? {
            let line = raw.position().map_or(0, csv::Position::line);
            let record: CsvRecord = raw
                .deserialize(Some(&headers))
                .map_err(csv_import_error)?;
            importer.insert(&record, line)?;
        }
        Ok(importer.finish())
    })
}

/// Open `path` and import it. The file is opened before the wipe so a
/// missing file does not erase anything.
pub fn import_from_path(catalog: &Catalog, user_id: i64, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| CatalogError::ImportError {
        line: 0,
        reason: format!("cannot open {}: {err}", path.display()),
    })?;
    read_csv(catalog, user_id, file)
}

/// Inserts rows for one import, remembering the author and genre ids it has
/// already linked so repeated titles are not linked twice.
struct Importer<'conn> {
    conn: &'conn Connection,
    user_id: i64,
    authors: HashMap<String, i64>,
    genres: HashMap<String, i64>,
    books: usize,
}

impl<'conn> Importer<'conn> {
    fn new(conn: &'conn Connection, user_id: i64) -> Self {
        Self {
            conn,
            user_id,
            authors: HashMap::new(),
            genres: HashMap::new(),
            books: 0,
        }
    }

    fn insert(&mut self, record: &CsvRecord, line: u64) -> Result<()> {
        let author_id = self.entry_id(DictionaryKind::Author, &record.author, line)?;
        let genre_id = self.entry_id(DictionaryKind::Genre, &record.genre, line)?;
        insert_book_in(
            self.conn,
            self.user_id,
            &record.book,
            author_id,
            genre_id,
            &record.status,
        )
        .map_err(|err| at_line(err, line))?;
        self.books += 1;
        Ok(())
    }

    fn entry_id(&mut self, kind: DictionaryKind, title: &str, line: u64) -> Result<i64> {
        let key = normalize_title(title);
        let cache = match kind {
            DictionaryKind::Author => &mut self.authors,
            DictionaryKind::Genre => &mut self.genres,
        };
        if let Some(id) = cache.get(&key) {
            return Ok(*id);
        }
        let id = add_entry_in(self.conn, kind, self.user_id, title).map_err(|err| at_line(err, line))?;
        cache.insert(key, id);
        Ok(id)
    }

    fn finish(self) -> usize {
        tracing::debug!(
            target: TARGET,
            user_id = self.user_id,
            books = self.books,
            authors = self.authors.len(),
            genres = self.genres.len(),
            "imported catalogue"
        );
        self.books
    }
}

/// Rewrite validation failures of a single row as an import error for that line.
fn at_line(err: CatalogError, line: u64) -> CatalogError {
    match err {
        CatalogError::InvalidInput(reason) => CatalogError::ImportError {
            line,
            reason: reason.to_string(),
        },
        other => other,
    }
}

fn csv_import_error(err: csv::Error) -> CatalogError {
    let line = err.position().map_or(0, csv::Position::line);
    tracing::warn!(target: TARGET, line, error = %err, "rejecting malformed CSV");
    CatalogError::ImportError {
        line,
        reason: err.to_string(),
    }
}

fn csv_write_error(err: csv::Error) -> CatalogError {
    CatalogError::StoreUnavailable {
        context: "failed to write CSV".to_string(),
        source: Some(Box::new(err)),
    }
}
