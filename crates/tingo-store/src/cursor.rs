//! Lazy cursors
//!
//! A cursor records its filter and modifiers; nothing is read until the first
//! call to [`Cursor::next_document`]. Results are then filtered, sorted,
//! skipped and limited in that order regardless of the order the modifiers
//! were applied in.

use crate::collection::Collection;
use crate::error::{Result, StoreError};
use crate::matcher::Predicate;
use bson::Document;
use std::collections::VecDeque;

pub struct Cursor {
    collection: Collection,
    filter: Document,
    skip: u64,
    limit: u64,
    sort: Vec<(String, i32)>,
    buffer: Option<VecDeque<Document>>,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(collection: Collection, filter: Document) -> Self {
        Self {
            collection,
            filter,
            skip: 0,
            limit: 0,
            sort: Vec::new(),
            buffer: None,
            closed: false,
        }
    }

    /// Skip the first `count` results
    pub fn skip(&mut self, count: u64) -> &mut Self {
        self.skip = count;
        self
    }

    /// Return at most `count` results; 0 means unlimited
    pub fn limit(&mut self, count: u64) -> &mut Self {
        self.limit = count;
        self
    }

    /// Sort by `(field, direction)` pairs; negative directions sort descending
    pub fn sort(&mut self, keys: Vec<(String, i32)>) -> &mut Self {
        self.sort = keys;
        self
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Whether results have been read yet; modifiers have no effect after this
    pub fn is_started(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Fetch the next document, `None` when exhausted
    pub fn next_document(&mut self) -> Result<Option<Document>> {
        if self.closed {
            return Err(StoreError::CursorClosed);
        }

        if self.buffer.is_none() {
            let predicate = Predicate::compile(&self.filter)?;
            let documents = self
                .collection
                .select(&predicate, &self.sort, self.skip, self.limit)?;
            self.buffer = Some(documents.into());
        }

        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }

    /// Release buffered results; closing twice fails with `CursorClosed`
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(StoreError::CursorClosed);
        }
        self.closed = true;
        self.buffer = None;
        Ok(())
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection.name())
            .field("filter", &self.filter)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("sort", &self.sort)
            .field("closed", &self.closed)
            .finish()
    }
}
