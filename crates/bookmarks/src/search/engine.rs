//! Query execution and top-term suggestions

use std::collections::HashMap;

use anyhow::{Context, Result};
use log::debug;

use crate::storage::{BookmarkField, Deadline, FieldTerms, IndexError, IndexStore, QueryRequest};

use super::{PAGE_SIZE, SearchResponse, TOP_TERMS, hit_from_raw};

/// Fields whose dictionary feeds `topTerms`
const TEXT_TERM_FIELDS: [BookmarkField; 2] = [BookmarkField::Title, BookmarkField::Description];

/// Fields whose dictionary feeds `tagTopTerms`
const TAG_TERM_FIELDS: [BookmarkField; 1] = [BookmarkField::Tags];

/// Search bookmarks and compute completions of the last query word
///
/// Returns at most [`PAGE_SIZE`] hits. Any failure, including the suggestion
/// lookups, fails the whole search; callers turn that into
/// [`SearchResponse::failed`].
pub fn search(
    store: &dyn IndexStore,
    query: &str,
    request_id: u64,
    deadline: &Deadline,
) -> Result<SearchResponse> {
    let page = store
        .query(&QueryRequest::search(query, PAGE_SIZE), deadline)
        .context("search")?;

    let hits = page
        .hits
        .into_iter()
        .map(hit_from_raw)
        .collect::<Result<Vec<_>, _>>()
        .context("search")?;

    let prefix = last_token(query).to_lowercase();
    let top = top_terms(store, &TEXT_TERM_FIELDS, &prefix, TOP_TERMS, deadline)
        .context("search: top terms")?;
    let tag_top = top_terms(store, &TAG_TERM_FIELDS, &prefix, TOP_TERMS, deadline)
        .context("search: tag top terms")?;

    debug!(
        "Search {:?}: {} of {} hits, prefix {:?}",
        query,
        hits.len(),
        page.total_hits,
        prefix
    );

    Ok(SearchResponse {
        request_id,
        total_hits: page.total_hits,
        error: false,
        hits,
        top_terms: top,
        tag_top_terms: tag_top,
    })
}

/// Last whitespace-delimited word of a query; the whole query if it has none
pub fn last_token(query: &str) -> &str {
    let trimmed = query.trim_end();
    match trimmed.rfind(char::is_whitespace) {
        Some(pos) => trimmed[pos..].trim_start(),
        None => trimmed,
    }
}

/// Most frequent dictionary terms starting with `prefix` across `fields`
///
/// Counts of a term found in several fields are summed. Terms are ranked by
/// descending count; equal counts keep the order in which the store listed
/// them.
pub fn top_terms(
    store: &dyn IndexStore,
    fields: &[BookmarkField],
    prefix: &str,
    count: usize,
    deadline: &Deadline,
) -> Result<Vec<String>, IndexError> {
    let per_field = store.enumerate_prefix_terms(fields, prefix, deadline)?;
    let mut ranked = merge_terms(per_field);
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(ranked
        .into_iter()
        .take(count)
        .map(|(term, _)| term)
        .collect())
}

/// Sum counts per term, keeping first-seen order
fn merge_terms(per_field: Vec<FieldTerms>) -> Vec<(String, u64)> {
    let mut merged: Vec<(String, u64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for field in per_field {
        for term in field.terms {
            match positions.get(&term.term) {
                Some(&pos) => merged[pos].1 += term.count,
                None => {
                    positions.insert(term.term.clone(), merged.len());
                    merged.push((term.term, term.count));
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bookmark, BookmarkFields, BookmarkId};
    use crate::storage::{TantivyStore, TermCount};
    use chrono::Utc;

    fn add(store: &TantivyStore, url: &str, title: &str, description: &str, tags: &[&str]) {
        let bookmark = Bookmark::from_fields(
            BookmarkId::generate(),
            BookmarkFields {
                url: url.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
            Utc::now(),
        );
        store.save(&bookmark, &Deadline::none()).unwrap();
    }

    fn field_terms(field: BookmarkField, terms: &[(&str, u64)]) -> FieldTerms {
        FieldTerms {
            field,
            terms: terms
                .iter()
                .map(|(t, c)| TermCount {
                    term: t.to_string(),
                    count: *c,
                })
                .collect(),
        }
    }

    #[test]
    fn test_last_token() {
        assert_eq!(last_token("go"), "go");
        assert_eq!(last_token("rust go"), "go");
        assert_eq!(last_token("rust  lang  "), "lang");
        assert_eq!(last_token(""), "");
        assert_eq!(last_token("title:rust\tweb"), "web");
    }

    #[test]
    fn test_merge_sums_across_fields() {
        let merged = merge_terms(vec![
            field_terms(BookmarkField::Title, &[("go", 1), ("golang", 2)]),
            field_terms(BookmarkField::Description, &[("gopher", 4), ("go", 3)]),
        ]);
        assert_eq!(
            merged,
            vec![
                ("go".to_string(), 4),
                ("golang".to_string(), 2),
                ("gopher".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_tag_top_terms_rank_by_count() -> anyhow::Result<()> {
        let store = TantivyStore::in_memory()?;
        for _ in 0..3 {
            add(&store, "http://a", "A", "", &["golang"]);
        }
        add(&store, "http://b", "B", "", &["go"]);

        let terms = top_terms(&store, &TAG_TERM_FIELDS, "go", TOP_TERMS, &Deadline::none())?;
        assert_eq!(terms, vec!["golang", "go"]);
        Ok(())
    }

    #[test]
    fn test_ties_keep_dictionary_order() -> anyhow::Result<()> {
        let store = TantivyStore::in_memory()?;
        add(&store, "http://a", "gamma beta alpha", "", &[]);

        let terms = top_terms(&store, &TEXT_TERM_FIELDS, "", TOP_TERMS, &Deadline::none())?;
        assert_eq!(terms, vec!["alpha", "beta", "gamma"]);
        Ok(())
    }

    #[test]
    fn test_top_terms_capped() -> anyhow::Result<()> {
        let store = TantivyStore::in_memory()?;
        add(&store, "http://a", "aa ab ac ad ae af ag", "", &[]);

        let terms = top_terms(&store, &TEXT_TERM_FIELDS, "a", TOP_TERMS, &Deadline::none())?;
        assert_eq!(terms.len(), TOP_TERMS);
        Ok(())
    }

    #[test]
    fn test_search_scenario() -> anyhow::Result<()> {
        let store = TantivyStore::in_memory()?;
        add(&store, "http://example.com", "Go Lang", "", &["go", "lang"]);
        add(&store, "http://rust-lang.org", "Rust", "systems", &["rust"]);

        let response = search(&store, "go", 3, &Deadline::none())?;
        assert_eq!(response.request_id, 3);
        assert!(!response.error);
        assert_eq!(response.total_hits, 1);
        assert_eq!(response.hits.len(), 1);

        let hit = &response.hits[0];
        assert!(hit.tags.contains(&"go".to_string()));
        assert!(hit.title_html.contains("<mark>Go</mark>"));
        assert_eq!(hit.url_html, "example.com");
        assert_eq!(response.tag_top_terms, vec!["go"]);
        assert_eq!(response.top_terms, vec!["go"]);
        Ok(())
    }

    #[test]
    fn test_search_no_matches() -> anyhow::Result<()> {
        let store = TantivyStore::in_memory()?;
        add(&store, "http://a", "Something", "", &[]);

        let response = search(&store, "nothing", 0, &Deadline::none())?;
        assert!(response.hits.is_empty());
        assert_eq!(response.total_hits, 0);
        Ok(())
    }

    #[test]
    fn test_search_syntax_error_keeps_kind() -> anyhow::Result<()> {
        let store = TantivyStore::in_memory()?;
        add(&store, "http://a", "A", "", &[]);

        let err = search(&store, "title:(broken", 0, &Deadline::none()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::QuerySyntax { .. })
        ));
        Ok(())
    }
}
