//! Index store trait and the request/response types crossing it

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{Deadline, IndexError};
use crate::models::{Bookmark, BookmarkId};

/// Stored bookmark fields addressable by queries, projections and the term
/// dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookmarkField {
    Url,
    Title,
    Description,
    Tags,
    CreationDate,
}

impl BookmarkField {
    /// Fields searched by free-text queries
    pub const SEARCHABLE: [BookmarkField; 4] = [
        BookmarkField::Title,
        BookmarkField::Description,
        BookmarkField::Url,
        BookmarkField::Tags,
    ];

    /// Every stored field
    pub const ALL: [BookmarkField; 5] = [
        BookmarkField::Url,
        BookmarkField::Title,
        BookmarkField::Description,
        BookmarkField::Tags,
        BookmarkField::CreationDate,
    ];

    /// Field name in the index and in JSON documents
    pub const fn name(self) -> &'static str {
        match self {
            BookmarkField::Url => "url",
            BookmarkField::Title => "title",
            BookmarkField::Description => "description",
            BookmarkField::Tags => "tags",
            BookmarkField::CreationDate => "creationDate",
        }
    }

    /// Whether the field is analyzed text with a term dictionary
    pub const fn is_text(self) -> bool {
        !matches!(self, BookmarkField::CreationDate)
    }
}

/// A free-text query against the store
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Query-string syntax of the engine; empty matches every document
    pub query: String,
    /// Maximum number of hits to return
    pub limit: usize,
    /// Number of ranked hits to skip
    pub offset: usize,
    /// Stored fields to load for each hit
    pub fields: Vec<BookmarkField>,
    /// Produce HTML highlight fragments for matched text fields
    pub highlight: bool,
}

impl QueryRequest {
    /// Ranked search loading every field, with highlighting
    pub fn search(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            offset: 0,
            fields: BookmarkField::ALL.to_vec(),
            highlight: true,
        }
    }

    /// Whole-corpus scan loading only the given fields
    pub fn scan(limit: usize, fields: &[BookmarkField]) -> Self {
        Self {
            query: String::new(),
            limit,
            offset: 0,
            fields: fields.to_vec(),
            highlight: false,
        }
    }
}

/// Stored values of one document; unloaded fields stay empty
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredFields {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Decoded at the store boundary, see [`super::decode_tags`]
    pub tags: Vec<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

impl StoredFields {
    /// Text value of a loaded field
    pub fn text(&self, field: BookmarkField) -> Option<&str> {
        match field {
            BookmarkField::Url => self.url.as_deref(),
            BookmarkField::Title => self.title.as_deref(),
            BookmarkField::Description => self.description.as_deref(),
            BookmarkField::Tags | BookmarkField::CreationDate => None,
        }
    }

    /// Convert a fully loaded document into a bookmark
    pub fn into_bookmark(self, id: BookmarkId) -> Result<Bookmark, IndexError> {
        let missing = |name: &str| IndexError::schema(format!("document {} has no {}", id, name));
        Ok(Bookmark {
            url: self.url.ok_or_else(|| missing("url"))?,
            title: self.title.ok_or_else(|| missing("title"))?,
            description: self.description.unwrap_or_default(),
            tags: self.tags,
            creation_date: self.creation_date.ok_or_else(|| missing("creationDate"))?,
            id,
        })
    }
}

/// One ranked match
#[derive(Debug, Clone)]
pub struct RawHit {
    pub id: BookmarkId,
    pub score: f32,
    pub fields: StoredFields,
    /// Escaped HTML of a field with matched spans wrapped in `<mark>`; only
    /// for fields where something matched
    pub fragments: HashMap<BookmarkField, String>,
}

/// A bounded page of matches
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Total number of matching documents, may exceed `hits.len()`
    pub total_hits: u64,
    pub hits: Vec<RawHit>,
}

/// Dictionary term with its corpus-wide document count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermCount {
    pub term: String,
    pub count: u64,
}

/// Prefix terms of one field, in dictionary order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTerms {
    pub field: BookmarkField,
    pub terms: Vec<TermCount>,
}

/// Trait for full-text bookmark index backends
///
/// Implementations are opened once per process (their constructor) and closed
/// once at shutdown. All methods may be called concurrently; every call takes a
/// [`Deadline`] and returns [`IndexError::DeadlineExceeded`] once it expires.
pub trait IndexStore: Send + Sync {
    /// Insert or fully replace the document stored under `bookmark.id`
    fn save(&self, bookmark: &Bookmark, deadline: &Deadline) -> Result<(), IndexError>;

    /// Fetch exactly one document by id
    ///
    /// Zero matches and more than one match both yield [`IndexError::NotFound`].
    fn get_by_id(&self, id: &BookmarkId, deadline: &Deadline) -> Result<Bookmark, IndexError>;

    /// Remove a document; removing an unknown id succeeds
    fn delete(&self, id: &BookmarkId, deadline: &Deadline) -> Result<(), IndexError>;

    /// Run a free-text query and return one ranked page plus the total count
    fn query(&self, request: &QueryRequest, deadline: &Deadline) -> Result<QueryPage, IndexError>;

    /// List indexed tokens starting with `prefix`, per field
    fn enumerate_prefix_terms(
        &self,
        fields: &[BookmarkField],
        prefix: &str,
        deadline: &Deadline,
    ) -> Result<Vec<FieldTerms>, IndexError>;

    /// Release the underlying resources; later calls fail with
    /// [`IndexError::StorageUnavailable`]
    fn close(&self) -> Result<(), IndexError>;
}
