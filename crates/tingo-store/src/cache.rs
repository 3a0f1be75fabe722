//! Bounded cache of decoded documents
//!
//! Collections keep every document in encoded form; decoding is the expensive
//! part of a scan, so recently decoded documents are kept here. Eviction drops
//! the least recently used entry.

use bson::Document;
use std::collections::HashMap;

pub struct DocumentCache {
    capacity: usize,
    max_object_size: usize,
    entries: HashMap<u64, CacheEntry>,
    tick: u64,
}

struct CacheEntry {
    document: Document,
    last_used: u64,
}

impl DocumentCache {
    pub fn new(capacity: usize, max_object_size: usize) -> Self {
        Self {
            capacity,
            max_object_size,
            entries: HashMap::new(),
            tick: 0,
        }
    }

    pub fn get(&mut self, seq: u64) -> Option<Document> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&seq).map(|entry| {
            entry.last_used = tick;
            entry.document.clone()
        })
    }

    /// Cache a decoded document; `encoded_size` decides whether it qualifies
    pub fn insert(&mut self, seq: u64, document: Document, encoded_size: usize) {
        if self.capacity == 0 || encoded_size > self.max_object_size {
            return;
        }

        if !self.entries.contains_key(&seq) && self.entries.len() >= self.capacity {
            self.evict_one();
        }

        self.tick += 1;
        self.entries.insert(
            seq,
            CacheEntry {
                document,
                last_used: self.tick,
            },
        );
    }

    pub fn invalidate(&mut self, seq: u64) {
        self.entries.remove(&seq);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_one(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(seq, _)| *seq);
        if let Some(seq) = oldest {
            self.entries.remove(&seq);
        }
    }
}
