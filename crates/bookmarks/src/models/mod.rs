//! Domain models for bookmark records

mod bookmark;

pub use bookmark::{Bookmark, BookmarkFields, BookmarkId, InvalidBookmark};
