//! Value converters
//!
//! Converters move field values between the representation the data-access
//! layer works with and the one stored natively. They are selected by raw
//! type token; unknown tokens get the identity converter.

use bson::Bson;
use std::fmt::Debug;
use tingo_common::{DriverError, Result};
use tingo_store::IdentifierKind;
use tracing::debug;

/// Raw type token of the store's native identifier
pub const RAW_TYPE_IDENTIFIER: &str = "ObjectID";

/// Bidirectional value transform for one raw type
pub trait Converter: Send + Sync + Debug {
    /// Native value to the value handed back to callers
    fn from_native(&self, value: Bson) -> Result<Bson>;

    /// Caller value to the value stored natively
    fn to_native(&self, value: Bson) -> Result<Bson>;
}

/// Identity in both directions
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl Converter for DefaultConverter {
    fn from_native(&self, value: Bson) -> Result<Bson> {
        Ok(value)
    }

    fn to_native(&self, value: Bson) -> Result<Bson> {
        Ok(value)
    }
}

/// Converts between native identifiers and their canonical string form
#[derive(Debug, Clone, Copy)]
pub struct IdentifierConverter {
    kind: IdentifierKind,
}

impl IdentifierConverter {
    pub fn new(kind: IdentifierKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }
}

impl Converter for IdentifierConverter {
    fn from_native(&self, value: Bson) -> Result<Bson> {
        self.kind.render(&value).map(Bson::String).ok_or_else(|| {
            DriverError::InvalidIdentifier(format!("{} is not a {:?} identifier", value, self.kind))
        })
    }

    fn to_native(&self, value: Bson) -> Result<Bson> {
        if self.kind.is_identifier(&value) {
            return Ok(value);
        }

        match &value {
            Bson::String(s) => self.kind.parse(s).ok_or_else(|| {
                DriverError::InvalidIdentifier(format!(
                    "'{}' cannot be parsed as a {:?} identifier",
                    s, self.kind
                ))
            }),
            other => Err(DriverError::InvalidIdentifier(format!(
                "{} cannot be converted to a {:?} identifier",
                other, self.kind
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConverterKind {
    Identifier,
}

/// Raw type tokens with a dedicated converter; everything else is identity
const RAW_TYPES: &[(&str, ConverterKind)] = &[(RAW_TYPE_IDENTIFIER, ConverterKind::Identifier)];

/// Logical declared type to raw type token
const LOGICAL_TYPES: &[(&str, &str)] = &[("identifier", RAW_TYPE_IDENTIFIER)];

/// Map a logical declared type to a raw type token, `""` when unmapped
pub fn coerce_type(logical_type: &str) -> &'static str {
    match LOGICAL_TYPES.iter().find(|(logical, _)| *logical == logical_type) {
        Some((_, raw)) => *raw,
        None => {
            debug!("No raw type for logical type '{}', using default", logical_type);
            ""
        }
    }
}

/// Build the converter for a raw type token
pub fn create_converter(raw_type: &str, identifier: IdentifierKind) -> Box<dyn Converter> {
    match RAW_TYPES.iter().find(|(token, _)| *token == raw_type) {
        Some((_, ConverterKind::Identifier)) => Box::new(IdentifierConverter::new(identifier)),
        None => {
            debug!("No converter for raw type '{}', using identity", raw_type);
            Box::new(DefaultConverter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_default_converter_is_identity() {
        let value = Bson::Document(bson::doc! { "a": [1, 2] });
        assert_eq!(DefaultConverter.from_native(value.clone()).unwrap(), value);
        assert_eq!(DefaultConverter.to_native(value.clone()).unwrap(), value);
    }

    #[test]
    fn test_object_id_round_trip() {
        let converter = IdentifierConverter::new(IdentifierKind::ObjectId);
        let id = Bson::ObjectId(ObjectId::new());

        let rendered = converter.from_native(id.clone()).unwrap();
        assert!(matches!(&rendered, Bson::String(s) if s.len() == 24));
        assert_eq!(converter.to_native(rendered).unwrap(), id);
        // Already native values pass through
        assert_eq!(converter.to_native(id.clone()).unwrap(), id);
    }

    #[test]
    fn test_sequential_round_trip() {
        let converter = IdentifierConverter::new(IdentifierKind::Sequential);
        let id = Bson::Int64(42);
        let rendered = converter.from_native(id.clone()).unwrap();
        assert_eq!(rendered, Bson::String("42".to_string()));
        assert_eq!(converter.to_native(rendered).unwrap(), id);
    }

    #[test]
    fn test_invalid_identifiers() {
        let converter = IdentifierConverter::new(IdentifierKind::ObjectId);
        assert!(matches!(
            converter.from_native(Bson::String("abc".into())),
            Err(DriverError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            converter.to_native(Bson::String("not-hex".into())),
            Err(DriverError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            converter.to_native(Bson::Boolean(true)),
            Err(DriverError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_coerce_type() {
        assert_eq!(coerce_type("identifier"), RAW_TYPE_IDENTIFIER);
        assert_eq!(coerce_type("string"), "");
    }

    #[test]
    fn test_create_converter_selection() {
        let id = Bson::ObjectId(ObjectId::new());

        let converter = create_converter("ObjectID", IdentifierKind::ObjectId);
        assert!(matches!(converter.from_native(id.clone()), Ok(Bson::String(_))));

        // Unknown tokens fail open to identity
        let converter = create_converter("Geometry", IdentifierKind::ObjectId);
        assert_eq!(converter.from_native(id.clone()).unwrap(), id);
    }
}
