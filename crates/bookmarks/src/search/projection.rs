//! Projection of raw index hits into the search response shape

use crate::storage::{BookmarkField, HIGHLIGHT_POST, HIGHLIGHT_PRE, IndexError, RawHit};

use super::Hit;

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Drop a leading `http://` or `https://` from a display url
///
/// Also handles the scheme being wrapped in highlight markers, as happens when
/// the query itself matched `http`.
pub fn strip_scheme(display: &str) -> &str {
    for scheme in ["https", "http"] {
        if let Some(rest) = display.strip_prefix(scheme).and_then(|r| r.strip_prefix("://")) {
            return rest;
        }
        let marked = display
            .strip_prefix(HIGHLIGHT_PRE)
            .and_then(|r| r.strip_prefix(scheme))
            .and_then(|r| r.strip_prefix(HIGHLIGHT_POST))
            .and_then(|r| r.strip_prefix("://"));
        if let Some(rest) = marked {
            return rest;
        }
    }
    display
}

/// HTML form of a field: the highlight fragment if one exists, otherwise the
/// escaped raw value
fn html_variant(hit: &RawHit, field: BookmarkField, raw: &str) -> String {
    match hit.fragments.get(&field) {
        Some(fragment) => fragment.clone(),
        None => html_escape(raw),
    }
}

/// Build the response hit for one raw match
///
/// `url` and `title` must have been loaded; a hit without them means the index
/// holds a document that was never written by this crate.
pub fn hit_from_raw(hit: RawHit) -> Result<Hit, IndexError> {
    let url = hit
        .fields
        .url
        .clone()
        .ok_or_else(|| IndexError::schema(format!("hit {} has no url", hit.id)))?;
    let title = hit
        .fields
        .title
        .as_deref()
        .ok_or_else(|| IndexError::schema(format!("hit {} has no title", hit.id)))?;
    let description = hit.fields.description.as_deref().unwrap_or_default();

    let url_html = strip_scheme(&html_variant(&hit, BookmarkField::Url, &url)).to_string();
    let title_html = html_variant(&hit, BookmarkField::Title, title);
    let description_html = html_variant(&hit, BookmarkField::Description, description);

    Ok(Hit {
        id: hit.id.to_string(),
        url,
        url_html,
        title_html,
        description_html,
        tags: hit.fields.tags,
    })
}
