//! Contracts the data-access layer programs against

use crate::converter::Converter;
use crate::mapping::{Expression, IndexDescriptor, QueryOptions};
use crate::native::NativeCollection;
use async_trait::async_trait;
use bson::{Bson, Document};
use std::sync::Arc;
use tingo_common::Result;

/// Asynchronous result cursor
#[async_trait]
pub trait DataCursor: Send {
    fn is_closed(&self) -> bool;

    /// Next row, `None` once the stream is exhausted
    async fn next(&mut self) -> Result<Option<Document>>;

    async fn close(&mut self) -> Result<()>;
}

/// Handle returned by [`Driver::ensure_collection`]
#[derive(Clone)]
pub struct CollectionHandle {
    name: String,
    fields: Vec<String>,
    primary_key: Vec<String>,
    collection: Arc<dyn NativeCollection>,
}

impl CollectionHandle {
    pub(crate) fn new(
        collection: Arc<dyn NativeCollection>,
        fields: Vec<String>,
        primary_key: Vec<String>,
    ) -> Self {
        Self {
            name: collection.name().to_string(),
            fields,
            primary_key,
            collection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn native(&self) -> &Arc<dyn NativeCollection> {
        &self.collection
    }
}

impl std::fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

/// Result of [`Driver::create`]
#[derive(Debug, Clone, PartialEq)]
pub struct InsertResult {
    /// Inserted documents as stored, `_id` included
    pub documents: Vec<Document>,
}

impl InsertResult {
    pub fn inserted_ids(&self) -> Vec<Bson> {
        self.documents
            .iter()
            .filter_map(|doc| doc.get("_id").cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A data-source driver
///
/// Every operation fails with `DriverClosed` once [`Driver::close`] has run.
#[async_trait]
pub trait Driver: Send + Sync {
    type Cursor: DataCursor;

    /// Open or create a collection. Idempotent.
    async fn ensure_collection(
        &self,
        name: &str,
        fields: &[String],
        primary_key: &[String],
    ) -> Result<CollectionHandle>;

    /// Create an index; an identical existing index is left as is
    async fn ensure_index(&self, collection: &str, index: &IndexDescriptor) -> Result<()>;

    /// Referential integrity is not enforced; always succeeds
    async fn ensure_foreign_key(&self, source: &str, target: &str, fields: &[String])
        -> Result<()>;

    async fn find(
        &self,
        collection: &str,
        query: Option<&Expression>,
        options: &QueryOptions,
    ) -> Result<Self::Cursor>;

    async fn find_one(&self, collection: &str, query: Option<&Expression>)
        -> Result<Option<Document>>;

    async fn create(&self, collection: &str, data: Vec<Document>) -> Result<InsertResult>;

    /// Store `data` for the record selected by `primary_key`
    async fn save(&self, collection: &str, primary_key: Document, data: Document) -> Result<u64>;

    async fn remove(&self, collection: &str, primary_key: Document) -> Result<u64>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Raw type token for a logical declared type, `""` when unmapped
    fn coerce_type(&self, logical_type: &str) -> &'static str;

    fn create_converter(&self, raw_type: &str) -> Box<dyn Converter>;
}
