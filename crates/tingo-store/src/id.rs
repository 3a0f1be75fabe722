//! Document identifiers
//!
//! A store either uses BSON ObjectIds or its own per-collection sequential
//! 64-bit identifiers. Both render to a canonical string and parse back.

use bson::{oid::ObjectId, Bson};
use serde::{Deserialize, Serialize};

/// Identifier type generated for documents inserted without `_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Per-collection increasing integers (`Bson::Int64`)
    #[default]
    Sequential,
    /// BSON ObjectId
    ObjectId,
}

impl IdentifierKind {
    /// Returns true if `value` is an identifier of this kind
    pub fn is_identifier(&self, value: &Bson) -> bool {
        match (self, value) {
            (IdentifierKind::ObjectId, Bson::ObjectId(_)) => true,
            (IdentifierKind::Sequential, Bson::Int64(n)) => *n >= 0,
            _ => false,
        }
    }

    /// Canonical string form of an identifier, `None` for other values
    pub fn render(&self, value: &Bson) -> Option<String> {
        match (self, value) {
            (IdentifierKind::ObjectId, Bson::ObjectId(oid)) => Some(oid.to_hex()),
            (IdentifierKind::Sequential, Bson::Int64(n)) if *n >= 0 => Some(n.to_string()),
            _ => None,
        }
    }

    /// Parse the canonical string form back into an identifier
    pub fn parse(&self, value: &str) -> Option<Bson> {
        match self {
            IdentifierKind::ObjectId => ObjectId::parse_str(value).ok().map(Bson::ObjectId),
            IdentifierKind::Sequential => match value.parse::<i64>() {
                Ok(n) if n >= 0 => Some(Bson::Int64(n)),
                _ => None,
            },
        }
    }
}

/// Integral value of a numeric `_id`, whatever its width
pub(crate) fn integral_id(id: &Bson) -> Option<i64> {
    match id {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

/// Key used to address a document by its `_id` inside a collection
pub(crate) fn id_key(id: &Bson) -> String {
    // Numeric ids compare equal across widths
    match integral_id(id) {
        Some(n) => format!("n:{}", n),
        None => format!("v:{}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_render_and_parse() {
        let oid = ObjectId::new();
        let kind = IdentifierKind::ObjectId;
        let rendered = kind.render(&Bson::ObjectId(oid)).unwrap();
        assert_eq!(rendered.len(), 24);
        assert_eq!(kind.parse(&rendered), Some(Bson::ObjectId(oid)));
    }

    #[test]
    fn test_sequential_render_and_parse() {
        let kind = IdentifierKind::Sequential;
        assert_eq!(kind.render(&Bson::Int64(42)), Some("42".to_string()));
        assert_eq!(kind.parse("42"), Some(Bson::Int64(42)));
        assert_eq!(kind.parse("-1"), None);
        assert_eq!(kind.parse("abc"), None);
    }

    #[test]
    fn test_render_rejects_foreign_values() {
        assert_eq!(IdentifierKind::ObjectId.render(&Bson::String("x".into())), None);
        assert_eq!(IdentifierKind::Sequential.render(&Bson::ObjectId(ObjectId::new())), None);
        assert_eq!(IdentifierKind::Sequential.render(&Bson::Int32(3)), None);
    }

    #[test]
    fn test_id_key_numeric_widths() {
        assert_eq!(id_key(&Bson::Int32(7)), id_key(&Bson::Int64(7)));
        assert_ne!(id_key(&Bson::Int64(7)), id_key(&Bson::String("7".into())));
    }
}
