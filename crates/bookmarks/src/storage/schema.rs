//! Tantivy schema for bookmark documents
//!
//! The schema is applied once, when the index is created. Reopening an index
//! uses the schema stored on disk, which [`check_compatible`] compares against
//! the one built here. Changing any text option or the analyzer requires a
//! full reindex, so bump [`SCHEMA_VERSION`] with it.

use tantivy::schema::{
    DateOptions, Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions,
};

use super::{BookmarkField, IndexError};

/// Version of the document layout, written into every commit payload
pub const SCHEMA_VERSION: u32 = 1;

/// Analyzer for every text field: split on non-alphanumerics, drop tokens
/// over 40 bytes, lowercase. No stemming, no stop words.
pub const ANALYZER: &str = "default";

/// Name of the id field
pub const ID_FIELD: &str = "id";

/// Commit payload identifying [`SCHEMA_VERSION`]
pub fn version_payload() -> String {
    format!("bookmarks-schema-v{}", SCHEMA_VERSION)
}

/// Build the Tantivy schema for bookmark indexing
pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    // Exact-match id, never tokenized
    builder.add_text_field(ID_FIELD, STRING | STORED);

    let text_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_index_option(IndexRecordOption::WithFreqsAndPositions)
                .set_tokenizer(ANALYZER),
        )
        .set_stored();

    builder.add_text_field(BookmarkField::Url.name(), text_opts.clone());
    builder.add_text_field(BookmarkField::Title.name(), text_opts.clone());
    builder.add_text_field(BookmarkField::Description.name(), text_opts.clone());
    // Multi-valued: one value per tag
    builder.add_text_field(BookmarkField::Tags.name(), text_opts);

    builder.add_date_field(
        BookmarkField::CreationDate.name(),
        DateOptions::default().set_stored().set_indexed().set_fast(),
    );

    builder.build()
}

/// Check that an on-disk schema matches [`build_schema`] field by field
pub fn check_compatible(existing: &Schema) -> Result<(), IndexError> {
    let expected = build_schema();
    for (field, entry) in expected.fields() {
        let name = expected.get_field_name(field);
        let found = existing
            .get_field(name)
            .map_err(|_| IndexError::schema(format!("index has no field {}", name)))?;
        if existing.get_field_entry(found) != entry {
            return Err(IndexError::schema(format!(
                "field {} differs from the expected layout",
                name
            )));
        }
    }
    Ok(())
}

/// Field handles for quick access during indexing and searching
#[derive(Debug, Clone)]
pub struct SchemaFields {
    pub id: Field,
    pub url: Field,
    pub title: Field,
    pub description: Field,
    pub tags: Field,
    pub creation_date: Field,
}

impl SchemaFields {
    /// Resolve field handles from a schema
    pub fn new(schema: &Schema) -> Result<Self, IndexError> {
        let get = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| IndexError::schema(format!("index has no field {}", name)))
        };
        Ok(Self {
            id: get(ID_FIELD)?,
            url: get(BookmarkField::Url.name())?,
            title: get(BookmarkField::Title.name())?,
            description: get(BookmarkField::Description.name())?,
            tags: get(BookmarkField::Tags.name())?,
            creation_date: get(BookmarkField::CreationDate.name())?,
        })
    }

    /// Handle of a bookmark field
    pub fn field(&self, field: BookmarkField) -> Field {
        match field {
            BookmarkField::Url => self.url,
            BookmarkField::Title => self.title,
            BookmarkField::Description => self.description,
            BookmarkField::Tags => self.tags,
            BookmarkField::CreationDate => self.creation_date,
        }
    }

    /// Fields parsed by free-text queries
    pub fn searchable(&self) -> Vec<Field> {
        BookmarkField::SEARCHABLE
            .iter()
            .map(|f| self.field(*f))
            .collect()
    }
}
