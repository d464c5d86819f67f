use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

use crate::api::ApiError;

/// Canonical identifier of a cached unit: an operation name plus parameters.
///
/// Two keys are equal exactly when their canonical strings are equal. Object
/// parameters are canonicalized with sorted fields and `null` fields dropped,
/// so `{"page":1,"genre":null}` and `{"page":1}` address the same entry.
#[derive(Clone)]
pub struct CacheKey {
    parts: Vec<Value>,
    canonical: String,
}

impl CacheKey {
    pub fn new(operation: &str) -> Self {
        Self::from_parts(vec![Value::String(operation.to_string())])
    }

    /// Appends one parameter to the key.
    pub fn with(self, part: impl Into<Value>) -> Self {
        let mut parts = self.parts;
        parts.push(part.into());
        Self::from_parts(parts)
    }

    fn from_parts(parts: Vec<Value>) -> Self {
        let parts: Vec<Value> = parts.iter().map(canonicalize).collect();
        let canonical = Value::Array(parts.clone()).to_string();
        Self { parts, canonical }
    }

    pub fn operation(&self) -> Option<&str> {
        self.parts.first().and_then(Value::as_str)
    }

    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// True when `prefix`'s parts are the leading parts of this key.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        prefix.parts.len() <= self.parts.len() && self.parts[..prefix.parts.len()] == prefix.parts[..]
    }

    /// The operation name must be a non-blank string.
    pub fn validate(&self) -> Result<(), ApiError> {
        match self.operation() {
            Some(op) if !op.trim().is_empty() => Ok(()),
            _ => Err(ApiError::validation(format!(
                "cache key {} has no operation name",
                self.canonical
            ))),
        }
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut names: Vec<&String> = fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k)
                .collect();
            names.sort();
            let mut sorted = Map::new();
            for name in names {
                sorted.insert(name.clone(), canonicalize(&fields[name.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.canonical)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_string() {
        let key = CacheKey::new("movies").with(json!({"page": 1}));
        assert_eq!(key.as_str(), r#"["movies",{"page":1}]"#);
        assert_eq!(key.operation(), Some("movies"));
    }

    #[test]
    fn test_object_field_order_is_irrelevant() {
        let a = CacheKey::new("movies").with(json!({"page": 1, "genre": "drama"}));
        let b = CacheKey::new("movies").with(json!({"genre": "drama", "page": 1}));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_null_fields_dropped() {
        let a = CacheKey::new("movies").with(json!({"page": 1, "genre": null}));
        let b = CacheKey::new("movies").with(json!({"page": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_parameter_order_matters() {
        let a = CacheKey::new("subtitles").with("m1").with("en");
        let b = CacheKey::new("subtitles").with("en").with("m1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_string_and_number_parameters_differ() {
        let a = CacheKey::new("movie").with("1");
        let b = CacheKey::new("movie").with(1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_matching() {
        let prefix = CacheKey::new("progress").with("u1");
        assert!(CacheKey::new("progress").with("u1").starts_with(&prefix));
        assert!(CacheKey::new("progress").with("u1").with("stats").starts_with(&prefix));
        assert!(!CacheKey::new("progress").with("u2").starts_with(&prefix));
        assert!(!CacheKey::new("progress").starts_with(&prefix));
        assert!(CacheKey::new("progress").with("u1").starts_with(&CacheKey::new("progress")));
    }

    #[test]
    fn test_validate_rejects_blank_operation() {
        assert!(CacheKey::new("health").validate().is_ok());
        let err = CacheKey::new("  ").validate().unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        assert!(CacheKey::new("").validate().is_err());
    }
}
