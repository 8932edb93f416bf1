//! Bookmarks crate - storage and search for a personal bookmark manager
//!
//! This crate provides:
//! - The bookmark model and identifier generation
//! - An index store trait with an embedded (Tantivy) and a hosted backend
//! - Free-text search with highlighted hits and top-term suggestions
//! - Tag facets over the whole collection
//! - Service configuration
//!
//! It has no HTTP dependencies; the `bookmarkd` binary exposes it over REST.

pub mod config;
pub mod models;
pub mod search;
pub mod service;
pub mod storage;

pub use config::{IndexConfig, ServerConfig, ServiceConfig};
pub use models::{Bookmark, BookmarkFields, BookmarkId, InvalidBookmark};
pub use search::{Hit, SearchResponse, all_tag_counts, all_tags, search};
pub use service::BookmarkService;
pub use storage::{
    BookmarkField, Deadline, HostedConfig, HostedStore, IndexError, IndexStore, QueryRequest,
    TantivyStore,
};
