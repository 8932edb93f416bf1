//! BookmarkService facade
//!
//! The entry point for the HTTP layer. Wraps the shared index store and turns
//! user input into stored bookmarks.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use log::info;

use crate::models::{Bookmark, BookmarkFields, BookmarkId};
use crate::search::{self, SearchResponse};
use crate::storage::{Deadline, IndexStore};

/// Bookmark operations over one shared index
#[derive(Clone)]
pub struct BookmarkService {
    store: Arc<dyn IndexStore>,
}

impl BookmarkService {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn IndexStore {
        self.store.as_ref()
    }

    /// Store a new bookmark under a freshly generated id
    ///
    /// The creation date is the current time in whole seconds, the precision
    /// the index keeps.
    pub fn create(&self, fields: BookmarkFields, deadline: &Deadline) -> Result<BookmarkId> {
        let fields = fields.normalized()?;
        let bookmark = Bookmark::from_fields(
            BookmarkId::generate(),
            fields,
            Utc::now().trunc_subsecs(0),
        );
        self.store.save(&bookmark, deadline).context("save")?;
        info!("Created bookmark {}", bookmark.id);
        Ok(bookmark.id)
    }

    /// Replace the fields of an existing bookmark, keeping its creation date
    pub fn update(&self, id: &BookmarkId, fields: BookmarkFields, deadline: &Deadline) -> Result<()> {
        let fields = fields.normalized()?;
        let existing = self.store.get_by_id(id, deadline).context("update")?;
        let bookmark = Bookmark::from_fields(id.clone(), fields, existing.creation_date);
        self.store.save(&bookmark, deadline).context("save")?;
        info!("Updated bookmark {}", id);
        Ok(())
    }

    pub fn get(&self, id: &BookmarkId, deadline: &Deadline) -> Result<Bookmark> {
        self.store.get_by_id(id, deadline).context("get")
    }

    /// Delete a bookmark; unknown ids succeed
    pub fn delete(&self, id: &BookmarkId, deadline: &Deadline) -> Result<()> {
        self.store.delete(id, deadline).context("delete")?;
        info!("Deleted bookmark {}", id);
        Ok(())
    }

    pub fn search(&self, query: &str, request_id: u64, deadline: &Deadline) -> Result<SearchResponse> {
        search::search(self.store.as_ref(), query, request_id, deadline)
    }

    pub fn tags(&self, deadline: &Deadline) -> Result<Vec<String>> {
        search::all_tags(self.store.as_ref(), deadline)
    }

    pub fn tag_counts(&self, deadline: &Deadline) -> Result<BTreeMap<String, u64>> {
        search::all_tag_counts(self.store.as_ref(), deadline)
    }

    /// Close the underlying store; later calls fail
    pub fn close(&self) -> Result<()> {
        self.store.close().context("close")
    }
}
