//! Cursor adapter over a native result stream

use crate::datasource::DataCursor;
use crate::native::NativeCursor;
use async_trait::async_trait;
use bson::Document;
use futures::stream::{self, Stream};
use tingo_common::{DriverError, Result};
use tracing::debug;

/// Single-owner cursor returned by `find`
///
/// Exhaustion does not close the cursor: `next` keeps returning `None` until
/// [`TingoCursor::close`] is called.
pub struct TingoCursor {
    native: Box<dyn NativeCursor>,
    collection: String,
    closed: bool,
}

impl TingoCursor {
    pub(crate) fn new(native: Box<dyn NativeCursor>, collection: impl Into<String>) -> Self {
        Self {
            native,
            collection: collection.into(),
            closed: false,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.native.is_closed()
    }

    pub async fn next(&mut self) -> Result<Option<Document>> {
        if self.is_closed() {
            return Err(DriverError::CursorAlreadyClosed);
        }
        self.native.next().await
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(DriverError::CursorAlreadyClosed);
        }
        self.closed = true;
        self.native.close().await?;
        debug!("Closed cursor on '{}'", self.collection);
        Ok(())
    }

    /// Drain the remaining rows without closing the cursor
    pub async fn to_list(&mut self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        while let Some(doc) = self.next().await? {
            documents.push(doc);
        }
        Ok(documents)
    }

    /// Stream the remaining rows; the stream ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Document>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut cursor = state?;
            match cursor.next().await {
                Ok(Some(doc)) => Some((Ok(doc), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[async_trait]
impl DataCursor for TingoCursor {
    fn is_closed(&self) -> bool {
        TingoCursor::is_closed(self)
    }

    async fn next(&mut self) -> Result<Option<Document>> {
        TingoCursor::next(self).await
    }

    async fn close(&mut self) -> Result<()> {
        TingoCursor::close(self).await
    }
}

impl std::fmt::Debug for TingoCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TingoCursor")
            .field("collection", &self.collection)
            .field("closed", &self.is_closed())
            .finish()
    }
}
