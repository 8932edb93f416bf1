//! Bookmark model and its identifier

use chrono::{DateTime, Utc};
use ring::digest;
use serde::{Deserialize, Deserializer, Serialize};

/// Length of a generated identifier: a hex-encoded SHA-512 digest
pub const ID_LEN: usize = 128;

/// Unique, content-independent identifier of a bookmark
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(pub String);

impl BookmarkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier.
    ///
    /// A random v4 UUID is hashed with SHA-512 and hex-encoded. The UUID is
    /// never reused, so two calls never describe the same record even for
    /// identical bookmark content. `uuid` aborts if the OS cannot provide
    /// secure randomness; no id can be issued in that state.
    pub fn generate() -> Self {
        let seed = uuid::Uuid::new_v4().to_string();
        let hash = digest::digest(&digest::SHA512, seed.as_bytes());
        Self(hex_encode(hash.as_ref()))
    }

    /// Whether this id has the shape of a generated identifier
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == ID_LEN && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BookmarkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BookmarkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A stored bookmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: BookmarkId,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Always present in output, possibly empty
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set once when the bookmark is created
    pub creation_date: DateTime<Utc>,
}

impl Bookmark {
    /// Build a bookmark from user-supplied fields
    pub fn from_fields(id: BookmarkId, fields: BookmarkFields, creation_date: DateTime<Utc>) -> Self {
        Self {
            id,
            url: fields.url,
            title: fields.title,
            description: fields.description,
            tags: fields.tags,
            creation_date,
        }
    }
}

/// Client-editable bookmark fields (create and update bodies)
///
/// Any `id` in the body is ignored; the identifier comes from the path or is
/// generated.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BookmarkFields {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

/// Rejected bookmark input
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidBookmark {
    #[error("url must not be empty")]
    EmptyUrl,
    #[error("title must not be empty")]
    EmptyTitle,
}

impl BookmarkFields {
    /// Trim values, drop blank and repeated tags, and reject records without
    /// url or title
    pub fn normalized(self) -> Result<Self, InvalidBookmark> {
        let url = self.url.trim().to_string();
        let title = self.title.trim().to_string();
        if url.is_empty() {
            return Err(InvalidBookmark::EmptyUrl);
        }
        if title.is_empty() {
            return Err(InvalidBookmark::EmptyTitle);
        }

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }

        Ok(Self {
            url,
            title,
            description: self.description.trim().to_string(),
            tags,
        })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_shape() {
        let id = BookmarkId::generate();
        assert_eq!(id.as_str().len(), ID_LEN);
        assert!(id.is_well_formed());
        assert!(id.as_str().chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = BookmarkId::generate();
        let b = BookmarkId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_well_formed_rejects_other_shapes() {
        assert!(!BookmarkId::new("abc").is_well_formed());
        assert!(!BookmarkId::new("z".repeat(ID_LEN)).is_well_formed());
        assert!(BookmarkId::new("0".repeat(ID_LEN)).is_well_formed());
    }

    #[test]
    fn test_fields_null_tags() {
        let fields: BookmarkFields =
            serde_json::from_str(r#"{"url":"http://a","title":"A","tags":null}"#).unwrap();
        assert!(fields.tags.is_empty());
        assert_eq!(fields.description, "");
    }

    #[test]
    fn test_fields_ignore_id() {
        let fields: BookmarkFields =
            serde_json::from_str(r#"{"id":"x","url":"http://a","title":"A"}"#).unwrap();
        assert_eq!(fields.url, "http://a");
    }

    #[test]
    fn test_normalized() {
        let fields = BookmarkFields {
            url: " http://example.com ".to_string(),
            title: "Example".to_string(),
            description: String::new(),
            tags: vec!["rust".to_string(), " ".to_string(), " web ".to_string()],
        };
        let fields = fields.normalized().unwrap();
        assert_eq!(fields.url, "http://example.com");
        assert_eq!(fields.tags, vec!["rust", "web"]);

        let repeated = BookmarkFields {
            url: "http://example.com".to_string(),
            title: "Example".to_string(),
            description: String::new(),
            tags: vec!["x".to_string(), "web".to_string(), " x ".to_string()],
        };
        assert_eq!(repeated.normalized().unwrap().tags, vec!["x", "web"]);

        let empty = BookmarkFields {
            url: "http://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(empty.normalized(), Err(InvalidBookmark::EmptyTitle));
    }

    #[test]
    fn test_bookmark_serializes_camel_case() {
        let bookmark = Bookmark::from_fields(
            BookmarkId::new("id1"),
            BookmarkFields {
                url: "http://a".to_string(),
                title: "A".to_string(),
                ..Default::default()
            },
            Utc::now(),
        );
        let json = serde_json::to_value(&bookmark).unwrap();
        assert!(json.get("creationDate").is_some());
        assert_eq!(json["tags"], serde_json::json!([]));
        assert_eq!(json["id"], "id1");
    }
}
