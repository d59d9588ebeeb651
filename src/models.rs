//! Plain data holders passed between the persistence helpers and whatever
//! front-end drives them. They mirror rows of the SQLite schema closely so the
//! query code can build them straight from a `Row`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// The two shared vocabularies. Both follow the same "global entry plus
/// per-user link" layout, so one implementation serves both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryKind {
    Author,
    Genre,
}

impl DictionaryKind {
    pub(crate) const fn entry_table(self) -> &'static str {
        match self {
            Self::Author => "authors",
            Self::Genre => "genres",
        }
    }

    pub(crate) const fn link_table(self) -> &'static str {
        match self {
            Self::Author => "user_author_links",
            Self::Genre => "user_genre_links",
        }
    }

    /// Foreign key column naming this vocabulary in `books` and in the link table.
    pub(crate) const fn id_column(self) -> &'static str {
        match self {
            Self::Author => "author_id",
            Self::Genre => "genre_id",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Genre => "genre",
        }
    }
}

impl fmt::Display for DictionaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An author or genre as seen from one user's vocabulary.
pub struct DictionaryEntry {
    pub id: i64,
    /// Always stored lower-cased.
    pub title: String,
}

impl fmt::Display for DictionaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One line of the book search results, with author and genre already joined
/// in so the table view can render it directly.
pub struct BookRow {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Full detail of a single book, used to pre-fill the edit form.
pub struct BookDetails {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub status: String,
}

/// Optional search filters. Every populated field narrows the result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilters {
    /// Case-insensitive substring of the book title.
    pub title: Option<String>,
    /// Exact author title, compared case-insensitively.
    pub author: Option<String>,
    /// Exact genre title, compared case-insensitively.
    pub genre: Option<String>,
    /// Exact status label.
    pub status: Option<String>,
}

impl BookFilters {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    #[must_use]
    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Order of book search results. Parsed from `"title"` or `"author"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Title,
    Author,
}

impl SortKey {
    pub(crate) const fn order_by(self) -> &'static str {
        match self {
            Self::Title => "b.title, b.id",
            Self::Author => "a.title, b.id",
        }
    }
}

impl FromStr for SortKey {
    type Err = CatalogError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key.trim().to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "author" => Ok(Self::Author),
            _ => Err(CatalogError::InvalidSortKey(key.to_string())),
        }
    }
}

/// A single CSV row. Field order is the column order of the exported file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CsvRecord {
    #[serde(rename = "Book")]
    pub book: String,
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "Genre")]
    pub genre: String,
    #[serde(rename = "Status")]
    pub status: String,
}

impl CsvRecord {
    #[must_use]
    pub fn new(
        book: impl Into<String>,
        author: impl Into<String>,
        genre: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            book: book.into(),
            author: author.into(),
            genre: genre.into(),
            status: status.into(),
        }
    }
}

/// Lower-case and trim a title the way every dictionary and book title is stored.
pub(crate) fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}
