//! Store options

use crate::id::IdentifierKind;
use serde::{Deserialize, Serialize};

/// Options applied to every collection of a [`crate::Db`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Keep all data in memory and never touch the database directory
    pub mem_store: bool,
    /// Identifier type generated for new documents
    pub identifier: IdentifierKind,
    /// Maximum number of decoded documents cached per collection
    pub cache_size: usize,
    /// Documents larger than this (encoded bytes) are never cached
    pub cache_max_obj_size: usize,
    /// Let a field holding an array match when any element matches
    pub search_in_array: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            mem_store: false,
            identifier: IdentifierKind::Sequential,
            cache_size: 1000,
            cache_max_obj_size: 1024,
            search_in_array: false,
        }
    }
}

impl StoreOptions {
    /// In-memory options with defaults for everything else
    pub fn in_memory() -> Self {
        Self {
            mem_store: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = StoreOptions::default();
        assert!(!options.mem_store);
        assert_eq!(options.identifier, IdentifierKind::Sequential);
        assert_eq!(options.cache_size, 1000);
        assert_eq!(options.cache_max_obj_size, 1024);
        assert!(!options.search_in_array);
    }

    #[test]
    fn test_in_memory_options() {
        let options = StoreOptions::in_memory();
        assert!(options.mem_store);
        assert_eq!(options.cache_size, 1000);
    }
}
