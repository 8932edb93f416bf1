//! Tag facets over the whole corpus

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use log::debug;

use crate::storage::{BookmarkField, Deadline, IndexStore, QueryRequest};

use super::TAG_SCAN_LIMIT;

/// Scan every bookmark's tags, counting each bookmark once per tag
///
/// A single unpaginated pass bounded by [`TAG_SCAN_LIMIT`]; fine for a
/// personal collection.
fn scan(store: &dyn IndexStore, deadline: &Deadline) -> Result<BTreeMap<String, u64>> {
    let page = store
        .query(
            &QueryRequest::scan(TAG_SCAN_LIMIT, &[BookmarkField::Tags]),
            deadline,
        )
        .context("tags")?;

    let mut counts = BTreeMap::new();
    for hit in page.hits {
        let distinct: HashSet<String> = hit.fields.tags.into_iter().collect();
        for tag in distinct {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }
    debug!(
        "Scanned {} bookmarks, {} distinct tags",
        page.total_hits,
        counts.len()
    );
    Ok(counts)
}

/// Every distinct tag, sorted ascending
pub fn all_tags(store: &dyn IndexStore, deadline: &Deadline) -> Result<Vec<String>> {
    Ok(scan(store, deadline)?.into_keys().collect())
}

/// Number of bookmarks carrying each tag
pub fn all_tag_counts(store: &dyn IndexStore, deadline: &Deadline) -> Result<BTreeMap<String, u64>> {
    scan(store, deadline)
}
