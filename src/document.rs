//! Documents and dotted-path field access.
//!
//! A [`Document`] pairs a caller-supplied id with a parsed JSON payload
//! and a query-time score. Field access navigates dotted paths into the
//! payload and materializes scalar values for the expression evaluator.

use serde_json::Value;

use crate::expression::ExprValue;

/// The JSON type observed at a field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int64,
    Double,
    String,
    Array,
    Object,
    /// The field is absent or explicitly null.
    Null,
}

/// A document as seen by queries and the predicate filter.
#[derive(Debug, Clone)]
pub struct Document {
    /// Caller-supplied identifier.
    pub id: String,
    /// Parsed JSON payload.
    pub source: Value,
    /// Relevance score, mutated at query time.
    pub score: f64,
}

impl Document {
    /// Create a document with a zero score.
    pub fn new(id: impl Into<String>, source: Value) -> Self {
        Document {
            id: id.into(),
            source,
            score: 0.0,
        }
    }

    /// Materialize the scalar value at a dotted field path.
    ///
    /// Returns `None` when the path is absent, contains empty components,
    /// traverses a non-object, or lands on an array, object, or null.
    pub fn get_field(&self, path: &str) -> Option<ExprValue> {
        let value = resolve_path(&self.source, path)?;
        match value {
            Value::Bool(b) => Some(ExprValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ExprValue::Int64(i))
                } else {
                    n.as_f64().map(ExprValue::Float64)
                }
            }
            Value::String(s) => Some(ExprValue::String(s.clone())),
            _ => None,
        }
    }

    /// Whether any value (scalar or not) exists at the path.
    pub fn has_field(&self, path: &str) -> bool {
        resolve_path(&self.source, path).is_some()
    }

    /// The JSON type at the path.
    pub fn field_type(&self, path: &str) -> FieldType {
        match resolve_path(&self.source, path) {
            None | Some(Value::Null) => FieldType::Null,
            Some(Value::Bool(_)) => FieldType::Bool,
            Some(Value::Number(n)) => {
                if n.as_i64().is_some() || n.as_u64().is_some() {
                    FieldType::Int64
                } else {
                    FieldType::Double
                }
            }
            Some(Value::String(_)) => FieldType::String,
            Some(Value::Array(_)) => FieldType::Array,
            Some(Value::Object(_)) => FieldType::Object,
        }
    }
}

/// Navigate a dotted path into a JSON value.
///
/// Empty components ("", "a..b", trailing dot) invalidate the whole path.
pub(crate) fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = root;
    for component in path.split('.') {
        if component.is_empty() {
            return None;
        }
        current = current.as_object()?.get(component)?;
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document::new(
            "d1",
            json!({
                "title": "red fox",
                "price": 10,
                "rating": 4.5,
                "active": true,
                "tags": ["new"],
                "vendor": {"name": "acme", "address": {"city": "berlin"}},
                "note": null
            }),
        )
    }

    #[test]
    fn test_get_field_scalars() {
        let doc = sample();
        assert_eq!(
            doc.get_field("title"),
            Some(ExprValue::String("red fox".to_string()))
        );
        assert_eq!(doc.get_field("price"), Some(ExprValue::Int64(10)));
        assert_eq!(doc.get_field("rating"), Some(ExprValue::Float64(4.5)));
        assert_eq!(doc.get_field("active"), Some(ExprValue::Bool(true)));
    }

    #[test]
    fn test_get_field_nested() {
        let doc = sample();
        assert_eq!(
            doc.get_field("vendor.name"),
            Some(ExprValue::String("acme".to_string()))
        );
        assert_eq!(
            doc.get_field("vendor.address.city"),
            Some(ExprValue::String("berlin".to_string()))
        );
    }

    #[test]
    fn test_get_field_non_scalar() {
        let doc = sample();
        // Arrays and objects do not materialize as scalars.
        assert_eq!(doc.get_field("tags"), None);
        assert_eq!(doc.get_field("vendor"), None);
        assert_eq!(doc.get_field("note"), None);
    }

    #[test]
    fn test_get_field_missing_and_invalid_paths() {
        let doc = sample();
        assert_eq!(doc.get_field("missing"), None);
        assert_eq!(doc.get_field("vendor.missing"), None);
        // Traversal through a non-object short-circuits.
        assert_eq!(doc.get_field("title.sub"), None);
        // Empty components invalidate the path.
        assert_eq!(doc.get_field(""), None);
        assert_eq!(doc.get_field("vendor..name"), None);
        assert_eq!(doc.get_field("vendor."), None);
    }

    #[test]
    fn test_has_field() {
        let doc = sample();
        assert!(doc.has_field("title"));
        assert!(doc.has_field("tags"));
        assert!(doc.has_field("vendor.address"));
        assert!(doc.has_field("note"));
        assert!(!doc.has_field("missing"));
        assert!(!doc.has_field("vendor..name"));
    }

    #[test]
    fn test_field_type() {
        let doc = sample();
        assert_eq!(doc.field_type("active"), FieldType::Bool);
        assert_eq!(doc.field_type("price"), FieldType::Int64);
        assert_eq!(doc.field_type("rating"), FieldType::Double);
        assert_eq!(doc.field_type("title"), FieldType::String);
        assert_eq!(doc.field_type("tags"), FieldType::Array);
        assert_eq!(doc.field_type("vendor"), FieldType::Object);
        assert_eq!(doc.field_type("note"), FieldType::Null);
        assert_eq!(doc.field_type("missing"), FieldType::Null);
    }
}
