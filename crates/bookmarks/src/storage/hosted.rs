//! Hosted search service store
//!
//! Talks to an Algolia-compatible REST API. Uses synchronous HTTP (ureq) like
//! the embedded store, so callers drive both the same way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::local::{HIGHLIGHT_POST, HIGHLIGHT_PRE};
use super::tags::decode_tags;
use super::{
    BookmarkField, Deadline, FieldTerms, IndexError, IndexStore, QueryPage, QueryRequest, RawHit,
    StoredFields, TermCount,
};
use crate::models::{Bookmark, BookmarkId};

/// Largest page the service returns for one query
const MAX_PAGE: usize = 1000;

/// Largest number of facet values returned for one prefix lookup
const MAX_FACET_HITS: usize = 100;

/// Connection settings for a hosted index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedConfig {
    pub app_id: String,
    pub api_key: String,
    pub index_name: String,
    /// Override of the service endpoint, e.g. for a local mock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl HostedConfig {
    fn endpoint(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.algolia.net", self.app_id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Map<String, Value>>,
    #[serde(default)]
    nb_hits: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FacetResponse {
    #[serde(default)]
    facet_hits: Vec<FacetHit>,
}

#[derive(Debug, Deserialize)]
struct FacetHit {
    value: String,
    count: u64,
}

/// Bookmark index kept by a hosted search service
pub struct HostedStore {
    config: HostedConfig,
    endpoint: String,
    agent: ureq::Agent,
    closed: AtomicBool,
}

impl std::fmt::Debug for HostedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedStore")
            .field("endpoint", &self.endpoint)
            .field("index", &self.config.index_name)
            .finish()
    }
}

impl HostedStore {
    /// Create a client for the configured index; no request is made yet
    pub fn open(config: HostedConfig) -> Result<Self, IndexError> {
        if config.app_id.is_empty() || config.api_key.is_empty() || config.index_name.is_empty() {
            return Err(IndexError::unavailable(
                "hosted index needs an application id, an API key and an index name",
            ));
        }
        let endpoint = config.endpoint();
        info!(
            "Using hosted bookmark index {} at {}",
            config.index_name, endpoint
        );
        Ok(Self {
            config,
            endpoint,
            agent: ureq::Agent::new_with_defaults(),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), IndexError> {
        if self.closed.load(Ordering::Acquire) {
            Err(IndexError::unavailable("index is closed"))
        } else {
            Ok(())
        }
    }

    fn index_url(&self, suffix: &str) -> String {
        format!(
            "{}/1/indexes/{}{}",
            self.endpoint,
            urlencoding::encode(&self.config.index_name),
            suffix
        )
    }

    fn object_url(&self, id: &BookmarkId) -> String {
        self.index_url(&format!("/{}", urlencoding::encode(id.as_str())))
    }

    /// Time budget for one request; an expired deadline fails before sending
    fn budget(deadline: &Deadline) -> Result<Option<Duration>, IndexError> {
        deadline.check()?;
        Ok(deadline.remaining())
    }

    fn send(
        &self,
        method: &str,
        url: &str,
        body: Option<&Value>,
        deadline: &Deadline,
    ) -> Result<Value, IndexError> {
        self.ensure_open()?;
        let timeout = Self::budget(deadline)?;
        debug!("{} {}", method, url);

        let result = match (method, body) {
            ("PUT", Some(body)) => self
                .agent
                .put(url)
                .config()
                .timeout_global(timeout)
                .build()
                .header("X-Algolia-Application-Id", &self.config.app_id)
                .header("X-Algolia-API-Key", &self.config.api_key)
                .send_json(body),
            ("POST", Some(body)) => self
                .agent
                .post(url)
                .config()
                .timeout_global(timeout)
                .build()
                .header("X-Algolia-Application-Id", &self.config.app_id)
                .header("X-Algolia-API-Key", &self.config.api_key)
                .send_json(body),
            ("DELETE", _) => self
                .agent
                .delete(url)
                .config()
                .timeout_global(timeout)
                .build()
                .header("X-Algolia-Application-Id", &self.config.app_id)
                .header("X-Algolia-API-Key", &self.config.api_key)
                .call(),
            _ => self
                .agent
                .get(url)
                .config()
                .timeout_global(timeout)
                .build()
                .header("X-Algolia-Application-Id", &self.config.app_id)
                .header("X-Algolia-API-Key", &self.config.api_key)
                .call(),
        };

        let mut response = result.map_err(|e| map_error(e, url))?;
        response
            .body_mut()
            .read_json()
            .map_err(|e| IndexError::io(format!("Failed to parse response: {}", e)))
    }
}

/// Map a transport or status failure onto the store error taxonomy
fn map_error(error: ureq::Error, url: &str) -> IndexError {
    match error {
        ureq::Error::StatusCode(404) => IndexError::not_found(url),
        ureq::Error::StatusCode(400) => IndexError::QuerySyntax {
            message: "request rejected by the search service".to_string(),
        },
        ureq::Error::StatusCode(code) if code >= 500 => {
            IndexError::unavailable(format!("search service returned {}", code))
        }
        ureq::Error::StatusCode(code) => {
            IndexError::io(format!("search service returned {}", code))
        }
        ureq::Error::Timeout(_) => IndexError::DeadlineExceeded,
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            IndexError::unavailable(format!("cannot reach search service: {}", error))
        }
        other => IndexError::io(other.to_string()),
    }
}

/// JSON document stored for a bookmark
fn to_object(bookmark: &Bookmark) -> Value {
    json!({
        "objectID": bookmark.id.as_str(),
        "url": bookmark.url,
        "title": bookmark.title,
        "description": bookmark.description,
        "tags": bookmark.tags,
        "creationDate": bookmark.creation_date.to_rfc3339(),
    })
}

fn string_field(object: &Map<String, Value>, name: &str) -> Result<Option<String>, IndexError> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(IndexError::schema(format!(
            "{} is not a string: {}",
            name, other
        ))),
    }
}

/// Decode the requested fields of a stored object
fn stored_fields(
    object: &Map<String, Value>,
    wanted: &[BookmarkField],
) -> Result<StoredFields, IndexError> {
    let mut stored = StoredFields::default();
    for field in wanted {
        match field {
            BookmarkField::Url => stored.url = string_field(object, field.name())?,
            BookmarkField::Title => stored.title = string_field(object, field.name())?,
            BookmarkField::Description => {
                stored.description = string_field(object, field.name())?;
            }
            BookmarkField::Tags => stored.tags = decode_tags(object.get(field.name()))?,
            BookmarkField::CreationDate => {
                stored.creation_date = string_field(object, field.name())?
                    .map(|s| {
                        DateTime::parse_from_rfc3339(&s)
                            .map(|d| d.with_timezone(&Utc))
                            .map_err(|e| IndexError::schema(format!("bad creationDate {}: {}", s, e)))
                    })
                    .transpose()?;
            }
        }
    }
    Ok(stored)
}

fn object_id(object: &Map<String, Value>) -> Result<BookmarkId, IndexError> {
    string_field(object, "objectID")?
        .map(BookmarkId::from)
        .ok_or_else(|| IndexError::schema("hit has no objectID"))
}

/// Highlight fragments of fields where something matched
fn fragments(object: &Map<String, Value>) -> HashMap<BookmarkField, String> {
    let mut fragments = HashMap::new();
    let Some(Value::Object(highlights)) = object.get("_highlightResult") else {
        return fragments;
    };
    for field in [
        BookmarkField::Url,
        BookmarkField::Title,
        BookmarkField::Description,
    ] {
        let Some(result) = highlights.get(field.name()) else {
            continue;
        };
        let matched = result
            .get("matchLevel")
            .and_then(Value::as_str)
            .is_some_and(|level| level != "none");
        if let (true, Some(value)) = (matched, result.get("value").and_then(Value::as_str)) {
            fragments.insert(field, value.to_string());
        }
    }
    fragments
}

fn raw_hit(object: &Map<String, Value>, request: &QueryRequest) -> Result<RawHit, IndexError> {
    Ok(RawHit {
        id: object_id(object)?,
        score: 0.0,
        fields: stored_fields(object, &request.fields)?,
        fragments: if request.highlight {
            fragments(object)
        } else {
            HashMap::new()
        },
    })
}

fn query_body(request: &QueryRequest, offset: usize, length: usize) -> Value {
    let attributes: Vec<&str> = request.fields.iter().map(|f| f.name()).collect();
    let mut body = json!({
        "query": request.query,
        "offset": offset,
        "length": length,
        "attributesToRetrieve": attributes,
    });
    if request.highlight {
        body["attributesToHighlight"] = json!(["url", "title", "description"]);
        body["highlightPreTag"] = json!(HIGHLIGHT_PRE);
        body["highlightPostTag"] = json!(HIGHLIGHT_POST);
    } else {
        body["attributesToHighlight"] = json!([]);
    }
    body
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, IndexError> {
    serde_json::from_value(value)
        .map_err(|e| IndexError::io(format!("Unexpected response shape: {}", e)))
}

impl IndexStore for HostedStore {
    fn save(&self, bookmark: &Bookmark, deadline: &Deadline) -> Result<(), IndexError> {
        let url = self.object_url(&bookmark.id);
        self.send("PUT", &url, Some(&to_object(bookmark)), deadline)?;
        debug!("Saved bookmark {}", bookmark.id);
        Ok(())
    }

    fn get_by_id(&self, id: &BookmarkId, deadline: &Deadline) -> Result<Bookmark, IndexError> {
        let url = self.object_url(id);
        let value = match self.send("GET", &url, None, deadline) {
            Err(IndexError::NotFound { .. }) => return Err(IndexError::not_found(id.as_str())),
            other => other?,
        };
        let Value::Object(object) = value else {
            return Err(IndexError::schema("stored object is not a JSON object"));
        };
        stored_fields(&object, &BookmarkField::ALL)?.into_bookmark(id.clone())
    }

    fn delete(&self, id: &BookmarkId, deadline: &Deadline) -> Result<(), IndexError> {
        let url = self.object_url(id);
        match self.send("DELETE", &url, None, deadline) {
            Ok(_) | Err(IndexError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn query(&self, request: &QueryRequest, deadline: &Deadline) -> Result<QueryPage, IndexError> {
        let url = self.index_url("/query");
        let mut page = QueryPage::default();
        let mut offset = request.offset;
        let mut wanted = request.limit;

        loop {
            let length = wanted.clamp(1, MAX_PAGE);
            let body = query_body(request, offset, length);
            let response: SearchResponse = decode(self.send("POST", &url, Some(&body), deadline)?)?;
            page.total_hits = response.nb_hits;

            if wanted == 0 {
                break;
            }
            let received = response.hits.len();
            for object in &response.hits {
                page.hits.push(raw_hit(object, request)?);
            }
            wanted = wanted.saturating_sub(received);
            offset += received;
            if received < length || wanted == 0 {
                break;
            }
        }

        page.hits.truncate(request.limit);
        Ok(page)
    }

    fn enumerate_prefix_terms(
        &self,
        fields: &[BookmarkField],
        prefix: &str,
        deadline: &Deadline,
    ) -> Result<Vec<FieldTerms>, IndexError> {
        let mut result = Vec::with_capacity(fields.len());
        for field in fields {
            // Only tags are declared as a facet; other fields expose no dictionary
            if *field != BookmarkField::Tags {
                debug!("Hosted index has no term dictionary for {}", field.name());
                result.push(FieldTerms {
                    field: *field,
                    terms: Vec::new(),
                });
                continue;
            }

            let url = self.index_url(&format!("/facets/{}/query", field.name()));
            let body = json!({ "facetQuery": prefix, "maxFacetHits": MAX_FACET_HITS });
            let response: FacetResponse = decode(self.send("POST", &url, Some(&body), deadline)?)?;
            result.push(FieldTerms {
                field: *field,
                terms: facet_terms(response, prefix),
            });
        }
        Ok(result)
    }

    fn close(&self) -> Result<(), IndexError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closed hosted bookmark index");
        }
        Ok(())
    }
}

/// Facet values starting with `prefix`, in dictionary order
fn facet_terms(response: FacetResponse, prefix: &str) -> Vec<TermCount> {
    let mut terms: Vec<TermCount> = response
        .facet_hits
        .into_iter()
        .filter(|hit| hit.value.to_lowercase().starts_with(prefix) && hit.count > 0)
        .map(|hit| TermCount {
            term: hit.value,
            count: hit.count,
        })
        .collect();
    terms.sort_by(|a, b| a.term.cmp(&b.term));
    terms
}
