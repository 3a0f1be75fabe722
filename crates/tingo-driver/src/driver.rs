//! Driver over the native store

use crate::converter::{self, Converter};
use crate::cursor::TingoCursor;
use crate::datasource::{CollectionHandle, Driver, InsertResult};
use crate::mapping::{Expression, IndexDescriptor, QueryOptions};
use crate::native::{NativeCollection, NativeStore};
use crate::query::QueryBuilder;
use crate::validation::validate_fields;
use async_trait::async_trait;
use bson::Document;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tingo_common::{DriverError, Result};
use tingo_store::{IdentifierKind, IndexOptions};
use tracing::{debug, info};

/// Driver bound to one store for its whole lifetime
pub struct TingoDriver {
    store: Arc<dyn NativeStore>,
    identifier: IdentifierKind,
    closed: AtomicBool,
}

impl TingoDriver {
    /// `identifier` is the kind of `_id` the store generates
    pub fn new(store: Arc<dyn NativeStore>, identifier: IdentifierKind) -> Self {
        Self {
            store,
            identifier,
            closed: AtomicBool::new(false),
        }
    }

    pub fn identifier_kind(&self) -> IdentifierKind {
        self.identifier
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DriverError::DriverClosed);
        }
        Ok(())
    }

    async fn collection(&self, name: &str) -> Result<Arc<dyn NativeCollection>> {
        self.check_open()?;
        self.store.collection(name).await
    }
}

#[async_trait]
impl Driver for TingoDriver {
    type Cursor = TingoCursor;

    async fn ensure_collection(
        &self,
        name: &str,
        fields: &[String],
        primary_key: &[String],
    ) -> Result<CollectionHandle> {
        validate_fields(fields)?;
        validate_fields(primary_key)?;
        let collection = self.collection(name).await?;
        Ok(CollectionHandle::new(
            collection,
            fields.to_vec(),
            primary_key.to_vec(),
        ))
    }

    async fn ensure_index(&self, collection: &str, index: &IndexDescriptor) -> Result<()> {
        let native = self.collection(collection).await?;
        let keys = QueryBuilder::compile_index_keys(index);
        let options = IndexOptions {
            name: Some(index.name.clone()),
            unique: index.unique,
        };

        native.ensure_index(keys, options).await?;
        debug!(
            "Ensured index '{}' on '{}' (unique: {})",
            index.name, collection, index.unique
        );
        Ok(())
    }

    async fn ensure_foreign_key(
        &self,
        source: &str,
        target: &str,
        _fields: &[String],
    ) -> Result<()> {
        self.check_open()?;
        debug!("Foreign key {} -> {} is not enforced", source, target);
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        query: Option<&Expression>,
        options: &QueryOptions,
    ) -> Result<TingoCursor> {
        let native = self.collection(collection).await?;
        let filter = QueryBuilder::compile(query);
        debug!("find on '{}': {}", collection, filter);

        let mut cursor = native.find(filter).await?;
        // Applied as skip, limit, sort; zero values are not applied
        if let Some(skip) = options.skip.filter(|n| *n > 0) {
            cursor.skip(skip);
        }
        if let Some(limit) = options.limit.filter(|n| *n > 0) {
            cursor.limit(limit);
        }
        if let Some(order_by) = options.order_by.as_ref().filter(|keys| !keys.is_empty()) {
            cursor.sort(QueryBuilder::compile_sort(order_by));
        }

        Ok(TingoCursor::new(cursor, collection))
    }

    async fn find_one(
        &self,
        collection: &str,
        query: Option<&Expression>,
    ) -> Result<Option<Document>> {
        let native = self.collection(collection).await?;
        native.find_one(QueryBuilder::compile(query)).await
    }

    async fn create(&self, collection: &str, data: Vec<Document>) -> Result<InsertResult> {
        let native = self.collection(collection).await?;
        let documents = native.insert(data).await?;
        Ok(InsertResult { documents })
    }

    /// Replaces the selected document with `data` (its `_id` is kept)
    async fn save(&self, collection: &str, primary_key: Document, data: Document) -> Result<u64> {
        let native = self.collection(collection).await?;
        native.update(primary_key, data).await
    }

    async fn remove(&self, collection: &str, primary_key: Document) -> Result<u64> {
        let native = self.collection(collection).await?;
        native.remove(primary_key).await
    }

    /// The store has no transactions; always succeeds
    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    /// The store has no transactions; always succeeds
    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::DriverClosed);
        }
        self.store.close().await?;
        info!("Closed tingo driver");
        Ok(())
    }

    fn coerce_type(&self, logical_type: &str) -> &'static str {
        converter::coerce_type(logical_type)
    }

    fn create_converter(&self, raw_type: &str) -> Box<dyn Converter> {
        converter::create_converter(raw_type, self.identifier)
    }
}

impl std::fmt::Debug for TingoDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TingoDriver")
            .field("identifier", &self.identifier)
            .field("closed", &self.is_closed())
            .finish()
    }
}
