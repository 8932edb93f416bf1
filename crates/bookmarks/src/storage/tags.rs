//! Decoding of the loosely typed `tags` field
//!
//! Backends hand tags back as a single string, a list of strings, or a list of
//! arbitrary JSON values. Everything is normalized here so downstream code only
//! sees `Vec<String>`. Any other shape means the stored data and the reading
//! code have drifted apart and is reported as a schema violation.

use log::error;
use serde_json::Value;

use super::IndexError;

/// Decode a JSON `tags` value
///
/// - absent or `null` → `[]`
/// - `"x"` → `["x"]`
/// - `["x", "y"]` → as-is
/// - anything else, including non-string list items → [`IndexError::SchemaViolation`]
pub fn decode_tags(value: Option<&Value>) -> Result<Vec<String>, IndexError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(tag)) => Ok(vec![tag.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(tag) => Ok(tag.clone()),
                other => Err(violation(other)),
            })
            .collect(),
        Some(other) => Err(violation(other)),
    }
}

/// Decode the values of a multi-valued index field
///
/// `None` items are values of a non-text type.
pub fn decode_tag_values<'a, I>(values: I) -> Result<Vec<String>, IndexError>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    values
        .into_iter()
        .map(|value| {
            value.map(str::to_string).ok_or_else(|| {
                error!("Stored tags value is not text");
                IndexError::schema("tags value is not text")
            })
        })
        .collect()
}

fn violation(value: &Value) -> IndexError {
    error!("Cannot decode tags from {}", value);
    IndexError::schema(format!("cannot decode tags from {}", value))
}
