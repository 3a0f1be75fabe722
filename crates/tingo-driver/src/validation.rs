//! Input validation for field names
//!
//! Field names end up as keys of native filters and are checked before they
//! reach the store. Collection names are checked by the store itself.

use tingo_common::{DriverError, Result};

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Field name that cannot be mistaken for a filter operator
///
/// - Not empty, at most 1024 bytes
/// - No null bytes
/// - Does not start with `$`
/// - No empty path segments (`a..b`, `.a`, `a.`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFieldName {
    name: String,
}

impl ValidatedFieldName {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(DriverError::Validation(
                "Field name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_FIELD_NAME_LENGTH {
            return Err(DriverError::Validation(format!(
                "Field name exceeds maximum length of {} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }

        if name.contains('\0') {
            return Err(DriverError::Validation(
                "Field name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with('$') {
            return Err(DriverError::Validation(format!(
                "Field name cannot start with '$' (reserved for operators): '{}'",
                name
            )));
        }

        if name.split('.').any(str::is_empty) {
            return Err(DriverError::Validation(format!(
                "Field name has an empty path segment: '{}'",
                name
            )));
        }

        Ok(ValidatedFieldName {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for ValidatedFieldName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Validate every field name in `fields`
pub fn validate_fields(fields: &[String]) -> Result<()> {
    for field in fields {
        ValidatedFieldName::new(field)?;
    }
    Ok(())
}
