//! Full-text index stores
//!
//! [`IndexStore`] is the single seam between the bookmark service and the
//! engine that keeps documents. Two backends implement it:
//!
//! - [`TantivyStore`]: an embedded index in a local directory
//! - [`HostedStore`]: an Algolia-compatible hosted search service

mod deadline;
mod error;
mod hosted;
mod local;
pub mod schema;
mod tags;
mod traits;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use deadline::Deadline;
pub use error::IndexError;
pub use hosted::{HostedConfig, HostedStore};
pub use local::{HIGHLIGHT_POST, HIGHLIGHT_PRE, TantivyStore};
pub use tags::{decode_tag_values, decode_tags};
pub use traits::{
    BookmarkField, FieldTerms, IndexStore, QueryPage, QueryRequest, RawHit, StoredFields,
    TermCount,
};

use crate::config::IndexConfig;

/// Open the store selected by `config`
pub fn open(config: &IndexConfig) -> Result<Arc<dyn IndexStore>> {
    let store: Arc<dyn IndexStore> = match config {
        IndexConfig::Local { path } => Arc::new(
            TantivyStore::open(path)
                .with_context(|| format!("Failed to open index at {}", path.display()))?,
        ),
        IndexConfig::Hosted(hosted) => Arc::new(
            HostedStore::open(hosted.clone()).context("Failed to configure hosted index")?,
        ),
    };
    Ok(store)
}
