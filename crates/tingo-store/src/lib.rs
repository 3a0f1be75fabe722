//! Embedded document store for tingo
//!
//! # Features
//! - Collections of BSON documents addressed by `_id`
//! - Filters in the `$`-operator dialect (`$and`, `$or`, `$eq`, `$in`, `$regex`, ...)
//! - Lazy cursors with skip, limit and sort
//! - Secondary index definitions with uniqueness enforcement
//! - Append-only collection files, or a purely in-memory mode
//! - Bounded cache of decoded documents

pub mod cache;
pub mod collection;
pub mod cursor;
pub mod db;
pub mod error;
pub mod id;
pub mod log;
pub mod matcher;
pub mod options;

pub use collection::{Collection, IndexInfo, IndexOptions};
pub use cursor::Cursor;
pub use db::Db;
pub use error::{Result, StoreError};
pub use id::IdentifierKind;
pub use options::StoreOptions;
