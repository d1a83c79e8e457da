//! Common API utilities and shared types
//!
//! Admin clients send ids as numbers or as numeric strings, and use an
//! explicit `null` to clear a field. The deserializers here accept both
//! shapes and keep "absent" apart from "null".

use serde::{Deserialize, Deserializer, Serialize};

use crate::api::middleware::ApiError;

/// `{ "message": ... }` body returned by delete and toggle endpoints
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

/// Non-numeric strings map to `None` so the owning service reports its own
/// validation message instead of a body rejection.
fn parse_raw_id(raw: RawId) -> Option<i64> {
    match raw {
        RawId::Number(n) => Some(n),
        RawId::Text(s) => s.trim().parse::<i64>().ok(),
    }
}

/// Optional id given as a number or a string. Empty or non-numeric strings
/// count as absent.
pub fn flexible_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.and_then(parse_raw_id))
}

/// Id field of a partial update.
///
/// Use with `#[serde(default)]`: absent stays `None`; `null`, `""` and
/// non-numeric strings become `Some(None)`.
pub fn nullable_flexible_id<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Option::<RawId>::deserialize(deserializer)?.and_then(parse_raw_id)))
}

/// Nullable field of a partial update. Use with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parse a numeric path segment
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::validation_error(format!("Invalid id: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Create {
        #[serde(default, deserialize_with = "flexible_id")]
        category_id: Option<i64>,
    }

    #[derive(Debug, Deserialize)]
    struct Update {
        #[serde(default, deserialize_with = "nullable_flexible_id")]
        category_id: Option<Option<i64>>,
        #[serde(default, deserialize_with = "double_option")]
        image: Option<Option<String>>,
    }

    #[test]
    fn test_flexible_id_accepts_number_and_string() {
        let a: Create = serde_json::from_str(r#"{"category_id": 3}"#).unwrap();
        let b: Create = serde_json::from_str(r#"{"category_id": "3"}"#).unwrap();
        let c: Create = serde_json::from_str(r#"{"category_id": ""}"#).unwrap();
        let d: Create = serde_json::from_str("{}").unwrap();
        assert_eq!(a.category_id, Some(3));
        assert_eq!(b.category_id, Some(3));
        assert_eq!(c.category_id, None);
        assert_eq!(d.category_id, None);
    }

    #[test]
    fn test_non_numeric_id_is_not_a_body_error() {
        let create: Create = serde_json::from_str(r#"{"category_id": "abc"}"#).unwrap();
        assert_eq!(create.category_id, None);

        let update: Update = serde_json::from_str(r#"{"category_id": "abc"}"#).unwrap();
        assert_eq!(update.category_id, Some(None));
    }

    #[test]
    fn test_update_distinguishes_absent_and_null() {
        let absent: Update = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.category_id, None);
        assert_eq!(absent.image, None);

        let null: Update = serde_json::from_str(r#"{"category_id": null, "image": null}"#).unwrap();
        assert_eq!(null.category_id, Some(None));
        assert_eq!(null.image, Some(None));

        let set: Update = serde_json::from_str(r#"{"category_id": "7", "image": "x.jpg"}"#).unwrap();
        assert_eq!(set.category_id, Some(Some(7)));
        assert_eq!(set.image, Some(Some("x.jpg".to_string())));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id("abc").unwrap_err().error.code, "VALIDATION_ERROR");
    }
}
