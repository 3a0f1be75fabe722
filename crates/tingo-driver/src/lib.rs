//! tingo data-source driver
//!
//! Lets a generic data-access layer run against the tingo embedded store.
//!
//! # Features
//! - Query builder compiling expression trees into `$`-operator filters
//! - Async driver contract: collections, indexes, CRUD, cursors
//! - Value converters selected by raw type token
//! - Configuration validation and store bootstrapping
//!
//! ```no_run
//! use tingo_driver::{create, Driver, DriverConfig, Expression, QueryOptions};
//!
//! # async fn run() -> tingo_driver::Result<()> {
//! let driver = create(DriverConfig::new("/tmp/app-db")).await?;
//! let query = Expression::gte("age", 18);
//! let mut cursor = driver
//!     .find("users", Some(&query), &QueryOptions::new().limit(10))
//!     .await?;
//! while let Some(user) = cursor.next().await? {
//!     println!("{}", user);
//! }
//! cursor.close().await?;
//! driver.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod converter;
pub mod cursor;
pub mod datasource;
pub mod driver;
pub mod factory;
pub mod mapping;
pub mod native;
pub mod query;
pub mod validation;

pub use config::DriverConfig;
pub use converter::{Converter, DefaultConverter, IdentifierConverter};
pub use cursor::TingoCursor;
pub use datasource::{CollectionHandle, DataCursor, Driver, InsertResult};
pub use driver::TingoDriver;
pub use factory::{create, create_from_json};
pub use mapping::{
    ComparisonOperator, Expression, IndexDescriptor, IndexField, OrderDirection, QueryOperator,
    QueryOptions, SortKey,
};
pub use native::{NativeCollection, NativeCursor, NativeStore};
pub use query::QueryBuilder;
pub use tingo_common::{DriverError, Result};
