//! Driver configuration
//!
//! The configuration set uses the upstream camelCase keys:
//!
//! ```json
//! { "path": "/var/lib/app/db", "memStore": false, "nativeObjectID": true,
//!   "cacheSize": 1000, "cacheMaxObjSize": 1024, "searchInArray": false }
//! ```

use serde::{Deserialize, Serialize};
use tingo_common::{DriverError, Result};
use tingo_store::{IdentifierKind, StoreOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DriverConfig {
    /// Database directory
    pub path: String,

    /// Keep everything in memory instead of under `path`
    #[serde(default)]
    pub mem_store: bool,

    /// Use BSON ObjectIds rather than sequential identifiers
    #[serde(default, rename = "nativeObjectID")]
    pub native_object_id: bool,

    /// Maximum number of cached documents per collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<i64>,

    /// Largest document (encoded bytes) eligible for the cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_max_obj_size: Option<i64>,

    /// Match array elements when a filter path crosses an array
    #[serde(default)]
    pub search_in_array: bool,
}

impl DriverConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mem_store: false,
            native_object_id: false,
            cache_size: None,
            cache_max_obj_size: None,
            search_in_array: false,
        }
    }

    pub fn mem_store(mut self, enabled: bool) -> Self {
        self.mem_store = enabled;
        self
    }

    pub fn native_object_id(mut self, enabled: bool) -> Self {
        self.native_object_id = enabled;
        self
    }

    pub fn cache_size(mut self, size: i64) -> Self {
        self.cache_size = Some(size);
        self
    }

    pub fn cache_max_obj_size(mut self, size: i64) -> Self {
        self.cache_max_obj_size = Some(size);
        self
    }

    pub fn search_in_array(mut self, enabled: bool) -> Self {
        self.search_in_array = enabled;
        self
    }

    /// Parse and validate a JSON configuration set
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DriverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(DriverError::Validation(
                "path must be a non-empty string".to_string(),
            ));
        }
        check_positive("cacheSize", self.cache_size)?;
        check_positive("cacheMaxObjSize", self.cache_max_obj_size)?;
        Ok(())
    }

    /// Store options for this configuration; unset cache sizes use store defaults
    pub fn store_options(&self) -> StoreOptions {
        let defaults = StoreOptions::default();
        StoreOptions {
            mem_store: self.mem_store,
            identifier: self.identifier_kind(),
            cache_size: self
                .cache_size
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.cache_size),
            cache_max_obj_size: self
                .cache_max_obj_size
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.cache_max_obj_size),
            search_in_array: self.search_in_array,
        }
    }

    pub fn identifier_kind(&self) -> IdentifierKind {
        if self.native_object_id {
            IdentifierKind::ObjectId
        } else {
            IdentifierKind::Sequential
        }
    }
}

fn check_positive(key: &str, value: Option<i64>) -> Result<()> {
    match value {
        Some(n) if n <= 0 => Err(DriverError::Validation(format!(
            "{} must be a positive integer, got {}",
            key, n
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_minimal() {
        let config = DriverConfig::from_json(r#"{"path":"/tmp/db"}"#).unwrap();
        assert_eq!(config, DriverConfig::new("/tmp/db"));
        assert_eq!(config.store_options().cache_size, 1000);
        assert_eq!(config.identifier_kind(), IdentifierKind::Sequential);
    }

    #[test]
    fn test_from_json_full() {
        let config = DriverConfig::from_json(
            r#"{"path":"db","memStore":true,"nativeObjectID":true,
                "cacheSize":50,"cacheMaxObjSize":4096,"searchInArray":true}"#,
        )
        .unwrap();

        let options = config.store_options();
        assert!(options.mem_store);
        assert_eq!(options.identifier, IdentifierKind::ObjectId);
        assert_eq!(options.cache_size, 50);
        assert_eq!(options.cache_max_obj_size, 4096);
        assert!(options.search_in_array);
    }

    #[test]
    fn test_rejects_empty_path() {
        let result = DriverConfig::from_json(r#"{"path":""}"#);
        assert!(matches!(result, Err(DriverError::Validation(_))));
    }

    #[test]
    fn test_rejects_missing_path() {
        let result = DriverConfig::from_json(r#"{"memStore":true}"#);
        assert!(matches!(result, Err(DriverError::Validation(_))));
    }

    #[test]
    fn test_rejects_non_positive_cache_sizes() {
        assert!(DriverConfig::new("db").cache_size(0).validate().is_err());
        assert!(DriverConfig::new("db").cache_max_obj_size(-5).validate().is_err());
        assert!(DriverConfig::new("db").cache_size(1).validate().is_ok());
    }

    #[test]
    fn test_rejects_fractional_and_unknown_keys() {
        assert!(DriverConfig::from_json(r#"{"path":"db","cacheSize":1.5}"#).is_err());
        assert!(DriverConfig::from_json(r#"{"path":"db","poolSize":4}"#).is_err());
    }
}
