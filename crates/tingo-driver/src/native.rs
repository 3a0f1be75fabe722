//! Native store seam
//!
//! The driver only talks to the embedded store through these traits.
//! [`tingo_store`] implements them, running its blocking work on tokio's
//! blocking pool.

use async_trait::async_trait;
use bson::Document;
use std::sync::Arc;
use tingo_common::{DriverError, Result};
use tingo_store::{Collection, Cursor, Db, IndexOptions};

#[async_trait]
pub trait NativeStore: Send + Sync {
    /// Open or create a collection
    async fn collection(&self, name: &str) -> Result<Arc<dyn NativeCollection>>;

    /// Release the store; later calls fail
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait NativeCollection: Send + Sync {
    fn name(&self) -> &str;

    async fn find(&self, filter: Document) -> Result<Box<dyn NativeCursor>>;

    async fn find_one(&self, filter: Document) -> Result<Option<Document>>;

    /// Insert documents, returning them with their `_id`
    async fn insert(&self, documents: Vec<Document>) -> Result<Vec<Document>>;

    /// Returns the number of documents modified
    async fn update(&self, selector: Document, data: Document) -> Result<u64>;

    /// Returns the number of documents removed
    async fn remove(&self, selector: Document) -> Result<u64>;

    /// Returns the index name
    async fn ensure_index(&self, keys: Document, options: IndexOptions) -> Result<String>;
}

/// Native result stream; modifiers are recorded until the first fetch
#[async_trait]
pub trait NativeCursor: Send {
    fn is_closed(&self) -> bool;

    fn skip(&mut self, count: u64);

    fn limit(&mut self, count: u64);

    fn sort(&mut self, keys: Vec<(String, i32)>);

    async fn next(&mut self) -> Result<Option<Document>>;

    async fn close(&mut self) -> Result<()>;
}

/// Run blocking store work off the async executor
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> tingo_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| DriverError::store("task", format!("store task failed: {}", e)))?
        .map_err(DriverError::from)
}

#[async_trait]
impl NativeStore for Db {
    async fn collection(&self, name: &str) -> Result<Arc<dyn NativeCollection>> {
        let db = self.clone();
        let name = name.to_string();
        let collection = blocking(move || db.collection(&name)).await?;
        Ok(Arc::new(collection))
    }

    async fn close(&self) -> Result<()> {
        let db = self.clone();
        blocking(move || db.close()).await
    }
}

#[async_trait]
impl NativeCollection for Collection {
    fn name(&self) -> &str {
        Collection::name(self)
    }

    async fn find(&self, filter: Document) -> Result<Box<dyn NativeCursor>> {
        Ok(Box::new(StoreCursor::new(Collection::find(self, filter))))
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        let collection = self.clone();
        blocking(move || Collection::find_one(&collection, filter)).await
    }

    async fn insert(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        let collection = self.clone();
        blocking(move || Collection::insert(&collection, documents)).await
    }

    async fn update(&self, selector: Document, data: Document) -> Result<u64> {
        let collection = self.clone();
        blocking(move || Collection::update(&collection, selector, data)).await
    }

    async fn remove(&self, selector: Document) -> Result<u64> {
        let collection = self.clone();
        blocking(move || Collection::remove(&collection, selector)).await
    }

    async fn ensure_index(&self, keys: Document, options: IndexOptions) -> Result<String> {
        let collection = self.clone();
        blocking(move || Collection::ensure_index(&collection, keys, options)).await
    }
}

/// [`NativeCursor`] over a store cursor
///
/// The cursor is moved onto the blocking pool for the first fetch and back.
/// A fetch that never hands it back leaves the cursor failed.
pub struct StoreCursor {
    state: CursorState,
}

enum CursorState {
    Open(Cursor),
    Failed(String),
    Closed,
}

const INTERRUPTED: &str = "cursor fetch was interrupted";

impl StoreCursor {
    pub fn new(cursor: Cursor) -> Self {
        Self {
            state: CursorState::Open(cursor),
        }
    }

    fn open_mut(&mut self) -> Option<&mut Cursor> {
        match &mut self.state {
            CursorState::Open(cursor) => Some(cursor),
            _ => None,
        }
    }
}

fn closed_error() -> DriverError {
    DriverError::from(tingo_store::StoreError::CursorClosed)
}

#[async_trait]
impl NativeCursor for StoreCursor {
    fn is_closed(&self) -> bool {
        match &self.state {
            CursorState::Open(cursor) => cursor.is_closed(),
            CursorState::Failed(_) => false,
            CursorState::Closed => true,
        }
    }

    fn skip(&mut self, count: u64) {
        if let Some(cursor) = self.open_mut() {
            cursor.skip(count);
        }
    }

    fn limit(&mut self, count: u64) {
        if let Some(cursor) = self.open_mut() {
            cursor.limit(count);
        }
    }

    fn sort(&mut self, keys: Vec<(String, i32)>) {
        if let Some(cursor) = self.open_mut() {
            cursor.sort(keys);
        }
    }

    async fn next(&mut self) -> Result<Option<Document>> {
        // Dropping this future mid-fetch leaves the interrupted marker behind
        let interrupted = CursorState::Failed(INTERRUPTED.to_string());
        let state = std::mem::replace(&mut self.state, interrupted);
        let mut cursor = match state {
            CursorState::Open(cursor) => cursor,
            CursorState::Failed(message) => {
                let err = DriverError::store("task", message.clone());
                self.state = CursorState::Failed(message);
                return Err(err);
            }
            CursorState::Closed => {
                self.state = CursorState::Closed;
                return Err(closed_error());
            }
        };

        // Only the first fetch reads the collection
        if cursor.is_started() {
            let result = cursor.next_document();
            self.state = CursorState::Open(cursor);
            return result.map_err(DriverError::from);
        }

        let joined = tokio::task::spawn_blocking(move || {
            let result = cursor.next_document();
            (cursor, result)
        })
        .await;

        match joined {
            Ok((cursor, result)) => {
                self.state = CursorState::Open(cursor);
                result.map_err(DriverError::from)
            }
            Err(e) => {
                let message = format!("store task failed: {}", e);
                tracing::warn!("{}", message);
                self.state = CursorState::Failed(message.clone());
                Err(DriverError::store("task", message))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match &mut self.state {
            CursorState::Open(cursor) => cursor.close().map_err(DriverError::from),
            CursorState::Failed(_) => {
                self.state = CursorState::Closed;
                Ok(())
            }
            CursorState::Closed => Err(closed_error()),
        }
    }
}
