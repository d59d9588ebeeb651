//! Per-user library catalogue backed by an embedded SQLite database.
//!
//! Authors and genres live in shared dictionaries deduplicated by lower-cased
//! title; each user links the entries they use. Books belong to one user and
//! reference one author and one genre from that user's vocabulary. Every
//! operation takes an explicit [`Catalog`] handle.
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::StoreConfig;
pub use db::Catalog;
pub use error::{CatalogError, Result};
pub use models::{
    BookDetails, BookFilters, BookRow, CsvRecord, DictionaryEntry, DictionaryKind, SortKey,
};
