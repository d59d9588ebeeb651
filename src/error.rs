//! Error taxonomy shared by every persistence helper. Each variant maps to a
//! situation the presentation layer reacts to differently, so callers match on
//! the variant instead of parsing messages.

use rusqlite::{Error as SqlError, ErrorCode};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// A lookup by id, title or credentials missed.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    /// The user already has this dictionary entry in their vocabulary.
    #[error("{kind} \"{title}\" is already in your library")]
    DuplicateLink { kind: &'static str, title: String },

    /// Unlinking was blocked because some of the user's books still use the entry.
    #[error("{kind} {entry_id} is still referenced by {books} book(s)")]
    EntryInUse {
        kind: &'static str,
        entry_id: i64,
        books: i64,
    },

    /// Low-level uniqueness or foreign key clash reported by SQLite.
    #[error("constraint violation: {0}")]
    ConstraintViolation(#[source] SqlError),

    #[error("unknown sort key `{0}` (expected `title` or `author`)")]
    InvalidSortKey(String),

    /// A CSV row could not be turned into a book record.
    #[error("import failed at line {line}: {reason}")]
    ImportError { line: u64, reason: String },

    #[error("username `{0}` is already registered")]
    UsernameTaken(String),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// The backing store could not be opened, read or written.
    #[error("catalog store unavailable: {context}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl CatalogError {
    pub(crate) fn unavailable(context: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            context: context.into(),
            source: None,
        }
    }

    /// True for the constraint class of errors, used by the retry-as-lookup path.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

/// Classify a SQLite error: constraint failures keep their own variant so the
/// dictionary layer can resolve them, anything else means the store is unusable.
pub(crate) fn map_store_error(err: SqlError, context: &str) -> CatalogError {
    if matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation)
    ) {
        CatalogError::ConstraintViolation(err)
    } else {
        CatalogError::StoreUnavailable {
            context: context.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Extension trait mirroring `anyhow::Context` for rusqlite results.
pub(crate) trait StoreContext<T> {
    fn store_context(self, context: &str) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, SqlError> {
    fn store_context(self, context: &str) -> Result<T> {
        self.map_err(|err| map_store_error(err, context))
    }
}
