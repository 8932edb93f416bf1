//! Bookmark search: free-text queries, top-term suggestions and tag facets
//!
//! Everything here runs through an [`IndexStore`](crate::storage::IndexStore),
//! so the same code serves the embedded and the hosted backend.

mod engine;
mod projection;
mod tags;

pub use engine::{last_token, search, top_terms};
pub use projection::{html_escape, hit_from_raw, strip_scheme};
pub use tags::{all_tag_counts, all_tags};

use serde::{Deserialize, Serialize};

/// Hits returned per search
pub const PAGE_SIZE: usize = 100;

/// Suggestions returned per group
pub const TOP_TERMS: usize = 5;

/// Page bound of the whole-corpus tag scan
pub const TAG_SCAN_LIMIT: usize = 1_000_000;

/// Response of a search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Echo of the client's request counter, used to drop stale responses
    #[serde(rename = "requestID")]
    pub request_id: u64,
    pub total_hits: u64,
    pub error: bool,
    pub hits: Vec<Hit>,
    /// Completions of the last query word from titles and descriptions
    pub top_terms: Vec<String>,
    /// Completions of the last query word from tags
    pub tag_top_terms: Vec<String>,
}

impl SearchResponse {
    /// Empty envelope reporting a failed search
    pub fn failed(request_id: u64) -> Self {
        Self {
            request_id,
            error: true,
            ..Default::default()
        }
    }
}

/// One search result, with HTML-safe display variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub url: String,
    #[serde(rename = "urlHTML")]
    pub url_html: String,
    #[serde(rename = "titleHTML")]
    pub title_html: String,
    #[serde(rename = "descriptionHTML")]
    pub description_html: String,
    pub tags: Vec<String>,
}
