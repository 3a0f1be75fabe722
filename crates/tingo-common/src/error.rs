//! Error types for tingo

use thiserror::Error;

/// Result type alias for tingo driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Unified error type for all driver operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Expression node carries an operator the query builder does not know
    #[error("Unknown operator: {operator}")]
    UnknownOperator { operator: String },

    /// Value cannot be converted to or from the store's identifier type
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Cursor is already closed")]
    CursorAlreadyClosed,

    /// An index with the same name but a different definition already exists
    #[error("Index conflict: {0}")]
    IndexConflict(String),

    #[error("Driver is closed")]
    DriverClosed,

    /// Any other failure raised by the underlying store
    #[error("Store error [{code}]: {message}")]
    Store { code: String, message: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl DriverError {
    /// Build a store error from a native code and message
    pub fn store(code: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Store {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error was raised by the underlying store rather
    /// than by the query or the driver itself
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            DriverError::Store { .. } | DriverError::IndexConflict(_)
        )
    }

    /// Returns true if this error points at a malformed query from the caller
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            DriverError::UnknownOperator { .. }
                | DriverError::Query(_)
                | DriverError::InvalidIdentifier(_)
        )
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Validation(err.to_string())
    }
}

// Store-specific error conversions (when store-errors feature is enabled)
#[cfg(feature = "store-errors")]
impl From<tingo_store::StoreError> for DriverError {
    fn from(err: tingo_store::StoreError) -> Self {
        match err {
            tingo_store::StoreError::IndexConflict(msg) => DriverError::IndexConflict(msg),
            other => DriverError::store(other.code(), other.to_string()),
        }
    }
}

#[cfg(feature = "store-errors")]
impl From<bson::ser::Error> for DriverError {
    fn from(err: bson::ser::Error) -> Self {
        DriverError::store("serialization", format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "store-errors")]
impl From<bson::de::Error> for DriverError {
    fn from(err: bson::de::Error) -> Self {
        DriverError::store("serialization", format!("BSON deserialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_operator() {
        let err = DriverError::UnknownOperator {
            operator: "$where".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown operator: $where");
    }

    #[test]
    fn test_error_display_store() {
        let err = DriverError::store("duplicate_key", "E11000 duplicate key");
        assert_eq!(err.to_string(), "Store error [duplicate_key]: E11000 duplicate key");
    }

    #[test]
    fn test_error_display_cursor_closed() {
        assert_eq!(
            DriverError::CursorAlreadyClosed.to_string(),
            "Cursor is already closed"
        );
    }

    #[test]
    fn test_error_display_index_conflict() {
        let err = DriverError::IndexConflict("idx_email".to_string());
        assert_eq!(err.to_string(), "Index conflict: idx_email");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: DriverError = json_err.into();
        assert!(matches!(err, DriverError::Validation(_)));
    }

    #[test]
    fn test_is_store_error() {
        assert!(DriverError::store("io", "disk full").is_store_error());
        assert!(DriverError::IndexConflict("test".to_string()).is_store_error());
        assert!(!DriverError::DriverClosed.is_store_error());
        assert!(!DriverError::Query("test".to_string()).is_store_error());
    }

    #[test]
    fn test_is_query_error() {
        assert!(DriverError::UnknownOperator {
            operator: "LIKE".to_string()
        }
        .is_query_error());
        assert!(DriverError::InvalidIdentifier("xyz".to_string()).is_query_error());
        assert!(!DriverError::CursorAlreadyClosed.is_query_error());
        assert!(!DriverError::store("io", "failed").is_query_error());
    }

    #[cfg(feature = "store-errors")]
    #[test]
    fn test_from_store_error() {
        let err: DriverError = tingo_store::StoreError::IndexConflict("idx".to_string()).into();
        assert_eq!(err, DriverError::IndexConflict("idx".to_string()));

        let err: DriverError = tingo_store::StoreError::Closed.into();
        assert!(matches!(err, DriverError::Store { ref code, .. } if code == "closed"));
    }
}
