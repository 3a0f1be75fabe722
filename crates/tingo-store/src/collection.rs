//! Collections
//!
//! A collection keeps its documents encoded in insertion order, addressed by
//! `_id`. Writes go to the collection file first (when the store is on disk)
//! and then to memory, under the collection's write lock.

use crate::cache::DocumentCache;
use crate::cursor::Cursor;
use crate::error::{Result, StoreError};
use crate::id::{id_key, integral_id, IdentifierKind};
use crate::log::{LogReader, LogRecord, LogWriter};
use crate::matcher::{compare_documents, resolve_path, Predicate};
use crate::options::StoreOptions;
use bson::{oid::ObjectId, Bson, Document};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Options for [`Collection::ensure_index`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Index name; derived from the keys when absent (`field_1_other_-1`)
    pub name: Option<String>,
    pub unique: bool,
}

/// Definition of an index as stored in the collection
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    /// Field to direction (`1` / `-1`) in key order
    pub keys: Document,
    pub unique: bool,
}

struct IndexState {
    info: IndexInfo,
    fields: Vec<Vec<String>>,
    /// Key to document sequence; maintained for unique indexes only
    entries: HashMap<String, u64>,
}

impl IndexState {
    fn new(info: IndexInfo) -> Self {
        let fields = info
            .keys
            .keys()
            .map(|k| k.split('.').map(str::to_string).collect())
            .collect();
        Self {
            info,
            fields,
            entries: HashMap::new(),
        }
    }

    fn key_for(&self, doc: &Document) -> String {
        self.fields
            .iter()
            .map(|path| {
                resolve_path(doc, path, false)
                    .first()
                    .map(|v| id_key(v))
                    .unwrap_or_else(|| id_key(&Bson::Null))
            })
            .collect::<Vec<_>>()
            .join("\u{1}")
    }
}

struct StoredDocument {
    id: Bson,
    raw: Vec<u8>,
}

struct CollectionState {
    next_seq: u64,
    documents: BTreeMap<u64, StoredDocument>,
    by_id: HashMap<String, u64>,
    indexes: Vec<IndexState>,
    next_id: i64,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            next_seq: 0,
            documents: BTreeMap::new(),
            by_id: HashMap::new(),
            indexes: Vec::new(),
            next_id: 1,
        }
    }

    /// Insert or replace the document with this `_id`, returning its sequence
    fn put(&mut self, id: Bson, raw: Vec<u8>) -> u64 {
        if let Some(n) = integral_id(&id) {
            if n >= self.next_id {
                self.next_id = n.saturating_add(1);
            }
        }

        let key = id_key(&id);
        if let Some(&seq) = self.by_id.get(&key) {
            if let Some(stored) = self.documents.get_mut(&seq) {
                stored.raw = raw;
                return seq;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.documents.insert(seq, StoredDocument { id, raw });
        self.by_id.insert(key, seq);
        seq
    }

    fn delete(&mut self, id: &Bson) -> Option<u64> {
        let seq = self.by_id.remove(&id_key(id))?;
        self.documents.remove(&seq);
        Some(seq)
    }

    fn define_index(&mut self, info: IndexInfo) {
        let index = IndexState::new(info);
        match self.indexes.iter_mut().find(|i| i.info.name == index.info.name) {
            Some(existing) => *existing = index,
            None => self.indexes.push(index),
        }
    }

    fn check_unique(&self, doc: &Document, exclude: Option<u64>) -> Result<()> {
        for index in self.indexes.iter().filter(|i| i.info.unique) {
            let key = index.key_for(doc);
            if let Some(&seq) = index.entries.get(&key) {
                if Some(seq) != exclude {
                    return Err(StoreError::DuplicateKey(format!(
                        "index '{}' already contains {}",
                        index.info.name,
                        describe_key(&index.info.keys, doc)
                    )));
                }
            }
        }
        Ok(())
    }

    fn index_document(&mut self, seq: u64, doc: &Document) {
        for index in self.indexes.iter_mut().filter(|i| i.info.unique) {
            let key = index.key_for(doc);
            index.entries.insert(key, seq);
        }
    }

    fn unindex_document(&mut self, seq: u64, doc: &Document) {
        for index in self.indexes.iter_mut().filter(|i| i.info.unique) {
            let key = index.key_for(doc);
            if index.entries.get(&key) == Some(&seq) {
                index.entries.remove(&key);
            }
        }
    }

    fn build_entries(&self, index: &IndexState) -> Result<HashMap<String, u64>> {
        let mut entries = HashMap::with_capacity(self.documents.len());
        for (seq, stored) in &self.documents {
            let doc = Document::from_reader(&stored.raw[..])?;
            let key = index.key_for(&doc);
            if entries.insert(key, *seq).is_some() {
                return Err(StoreError::DuplicateKey(format!(
                    "cannot build unique index '{}': duplicate {}",
                    index.info.name,
                    describe_key(&index.info.keys, &doc)
                )));
            }
        }
        Ok(entries)
    }

    fn rebuild_unique_indexes(&mut self) -> Result<()> {
        for pos in 0..self.indexes.len() {
            if self.indexes[pos].info.unique {
                let entries = self.build_entries(&self.indexes[pos])?;
                self.indexes[pos].entries = entries;
            }
        }
        Ok(())
    }
}

fn describe_key(keys: &Document, doc: &Document) -> String {
    let parts: Vec<String> = keys
        .keys()
        .map(|field| {
            let path: Vec<String> = field.split('.').map(str::to_string).collect();
            let value = resolve_path(doc, &path, false)
                .first()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            format!("{}: {}", field, value)
        })
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

fn encode(doc: &Document) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    doc.to_writer(&mut raw)?;
    Ok(raw)
}

/// Normalize index keys to `Int32(1)` / `Int32(-1)` directions
fn normalize_index_keys(keys: &Document) -> Result<Document> {
    if keys.is_empty() {
        return Err(StoreError::Query("index keys cannot be empty".to_string()));
    }

    let mut normalized = Document::new();
    for (field, direction) in keys {
        let dir = match direction {
            Bson::Int32(n) => *n as i64,
            Bson::Int64(n) => *n,
            Bson::Double(f) if f.fract() == 0.0 => *f as i64,
            other => {
                return Err(StoreError::Query(format!(
                    "index direction for '{}' must be 1 or -1, got {}",
                    field, other
                )))
            }
        };
        match dir {
            1 => normalized.insert(field.clone(), Bson::Int32(1)),
            -1 => normalized.insert(field.clone(), Bson::Int32(-1)),
            _ => {
                return Err(StoreError::Query(format!(
                    "index direction for '{}' must be 1 or -1, got {}",
                    field, dir
                )))
            }
        };
    }
    Ok(normalized)
}

fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, dir)| format!("{}_{}", field, dir))
        .collect::<Vec<_>>()
        .join("_")
}

fn replay(path: &Path, state: &mut CollectionState) -> Result<usize> {
    let mut reader = LogReader::open(path)?;
    let mut count = 0;

    while let Some(record) = reader.read_record()? {
        match record {
            LogRecord::Put { id, doc } => {
                let raw = encode(&doc)?;
                state.put(id, raw);
            }
            LogRecord::Delete { id } => {
                state.delete(&id);
            }
            LogRecord::Index { name, keys, unique } => {
                state.define_index(IndexInfo { name, keys, unique });
            }
        }
        count += 1;
    }

    Ok(count)
}

struct CollectionInner {
    name: String,
    options: StoreOptions,
    state: RwLock<CollectionState>,
    cache: Mutex<DocumentCache>,
    log: Mutex<Option<LogWriter>>,
    db_closed: Arc<AtomicBool>,
}

/// Handle to a collection; cheap to clone
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl Collection {
    /// Open a collection, replaying `file` when it exists
    pub(crate) fn open(
        name: &str,
        file: Option<PathBuf>,
        options: StoreOptions,
        db_closed: Arc<AtomicBool>,
    ) -> Result<Self> {
        let mut state = CollectionState::new();

        let log = match file {
            Some(path) => {
                if path.exists() {
                    let records = replay(&path, &mut state)?;
                    info!(
                        "Loaded collection '{}': {} records, {} documents",
                        name,
                        records,
                        state.documents.len()
                    );
                }
                Some(LogWriter::open(&path)?)
            }
            None => None,
        };
        state.rebuild_unique_indexes()?;

        let cache = DocumentCache::new(options.cache_size, options.cache_max_obj_size);

        Ok(Self {
            inner: Arc::new(CollectionInner {
                name: name.to_string(),
                options,
                state: RwLock::new(state),
                cache: Mutex::new(cache),
                log: Mutex::new(log),
                db_closed,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Open a lazy cursor over documents matching `filter`
    ///
    /// The filter is compiled when the first document is fetched, so filter
    /// errors surface from [`Cursor::next_document`].
    pub fn find(&self, filter: Document) -> Cursor {
        Cursor::new(self.clone(), filter)
    }

    pub fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        let predicate = Predicate::compile(&filter)?;
        Ok(self.select(&predicate, &[], 0, 1)?.into_iter().next())
    }

    /// Insert documents, generating `_id` where missing
    ///
    /// Documents are inserted in order; a failure leaves earlier ones in place.
    pub fn insert(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        self.check_open()?;
        let mut state = self.inner.state.write();
        let mut inserted = Vec::with_capacity(documents.len());

        for doc in documents {
            let existing = doc.get("_id").cloned();
            let (id, doc) = match existing {
                Some(id) => (id, doc),
                None => {
                    let id = self.generate_id(&mut state);
                    let mut with_id = Document::new();
                    with_id.insert("_id", id.clone());
                    for (key, value) in doc {
                        with_id.insert(key, value);
                    }
                    (id, with_id)
                }
            };

            if state.by_id.contains_key(&id_key(&id)) {
                return Err(StoreError::DuplicateKey(format!(
                    "collection '{}' already contains _id {}",
                    self.inner.name, id
                )));
            }
            state.check_unique(&doc, None)?;

            let raw = encode(&doc)?;
            self.append_log(&LogRecord::Put {
                id: id.clone(),
                doc: doc.clone(),
            })?;
            let seq = state.put(id, raw);
            state.index_document(seq, &doc);
            inserted.push(doc);
        }

        Ok(inserted)
    }

    /// Update the first document matching `selector`
    ///
    /// An update made only of `$set` / `$unset` / `$inc` operators modifies
    /// the document in place; any other document replaces it, keeping `_id`.
    /// Returns the number of documents modified (0 or 1).
    pub fn update(&self, selector: Document, update: Document) -> Result<u64> {
        self.check_open()?;
        let predicate = Predicate::compile(&selector)?;

        let operator_keys = update.keys().filter(|k| k.starts_with('$')).count();
        let is_operator_update = operator_keys > 0;
        if is_operator_update && operator_keys != update.len() {
            return Err(StoreError::Query(
                "update cannot mix operators and plain fields".to_string(),
            ));
        }

        let mut state = self.inner.state.write();
        let search = self.inner.options.search_in_array;

        let mut target = None;
        for (seq, stored) in &state.documents {
            let doc = self.decode(*seq, stored)?;
            if predicate.matches(&doc, search) {
                target = Some((*seq, stored.id.clone(), doc));
                break;
            }
        }
        let (seq, id, current) = match target {
            Some(found) => found,
            None => return Ok(0),
        };

        let updated = if is_operator_update {
            let mut doc = current.clone();
            apply_update_operators(&mut doc, &update)?;
            doc
        } else {
            replacement(&id, update)?
        };

        state.check_unique(&updated, Some(seq))?;
        let raw = encode(&updated)?;
        self.append_log(&LogRecord::Put {
            id: id.clone(),
            doc: updated.clone(),
        })?;

        state.unindex_document(seq, &current);
        state.put(id, raw);
        state.index_document(seq, &updated);
        self.inner.cache.lock().invalidate(seq);

        Ok(1)
    }

    /// Remove every document matching `selector`, returning the count
    pub fn remove(&self, selector: Document) -> Result<u64> {
        self.check_open()?;
        let predicate = Predicate::compile(&selector)?;
        let mut state = self.inner.state.write();
        let search = self.inner.options.search_in_array;

        let mut doomed = Vec::new();
        for (seq, stored) in &state.documents {
            let doc = self.decode(*seq, stored)?;
            if predicate.matches(&doc, search) {
                doomed.push((*seq, stored.id.clone(), doc));
            }
        }

        for (seq, id, doc) in &doomed {
            self.append_log(&LogRecord::Delete { id: id.clone() })?;
            state.unindex_document(*seq, doc);
            state.delete(id);
            self.inner.cache.lock().invalidate(*seq);
        }

        Ok(doomed.len() as u64)
    }

    /// Define an index
    ///
    /// Defining an index identical to an existing one is a no-op. Reusing a
    /// name with different keys or uniqueness fails with `IndexConflict`.
    /// Returns the index name.
    pub fn ensure_index(&self, keys: Document, options: IndexOptions) -> Result<String> {
        self.check_open()?;
        let keys = normalize_index_keys(&keys)?;
        let name = options.name.unwrap_or_else(|| default_index_name(&keys));
        let mut state = self.inner.state.write();

        if let Some(existing) = state.indexes.iter().find(|i| i.info.name == name) {
            if existing.info.keys == keys && existing.info.unique == options.unique {
                return Ok(name);
            }
            return Err(StoreError::IndexConflict(format!(
                "index '{}' already exists on collection '{}' with keys {} (unique: {})",
                name, self.inner.name, existing.info.keys, existing.info.unique
            )));
        }

        let mut index = IndexState::new(IndexInfo {
            name: name.clone(),
            keys: keys.clone(),
            unique: options.unique,
        });
        if options.unique {
            index.entries = state.build_entries(&index)?;
        }

        self.append_log(&LogRecord::Index {
            name: name.clone(),
            keys,
            unique: options.unique,
        })?;
        state.indexes.push(index);

        debug!(
            "Created index '{}' on '{}' (unique: {})",
            name, self.inner.name, options.unique
        );
        Ok(name)
    }

    pub fn indexes(&self) -> Vec<IndexInfo> {
        self.inner
            .state
            .read()
            .indexes
            .iter()
            .map(|i| i.info.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.state.read().documents.len()
    }

    /// Flush the collection file to disk
    pub fn sync(&self) -> Result<()> {
        if let Some(writer) = self.inner.log.lock().as_mut() {
            writer.sync()?;
        }
        Ok(())
    }

    /// Matching documents after sort, skip and limit (`limit == 0` means none)
    pub(crate) fn select(
        &self,
        predicate: &Predicate,
        sort: &[(String, i32)],
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>> {
        self.check_open()?;
        let state = self.inner.state.read();
        let search = self.inner.options.search_in_array;
        // Without a sort the scan can stop once the window is filled
        let stop_after = if sort.is_empty() && limit > 0 {
            Some(skip.saturating_add(limit))
        } else {
            None
        };

        let mut matched = Vec::new();
        for (seq, stored) in &state.documents {
            let doc = self.decode(*seq, stored)?;
            if predicate.matches(&doc, search) {
                matched.push(doc);
                if stop_after.is_some_and(|n| matched.len() as u64 >= n) {
                    break;
                }
            }
        }
        drop(state);

        if !sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, sort));
        }

        let take = if limit == 0 { usize::MAX } else { limit as usize };
        Ok(matched.into_iter().skip(skip as usize).take(take).collect())
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.db_closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn generate_id(&self, state: &mut CollectionState) -> Bson {
        match self.inner.options.identifier {
            IdentifierKind::ObjectId => Bson::ObjectId(ObjectId::new()),
            IdentifierKind::Sequential => {
                let id = state.next_id;
                state.next_id += 1;
                Bson::Int64(id)
            }
        }
    }

    fn decode(&self, seq: u64, stored: &StoredDocument) -> Result<Document> {
        if let Some(doc) = self.inner.cache.lock().get(seq) {
            return Ok(doc);
        }
        let doc = Document::from_reader(&stored.raw[..])?;
        self.inner
            .cache
            .lock()
            .insert(seq, doc.clone(), stored.raw.len());
        Ok(doc)
    }

    fn append_log(&self, record: &LogRecord) -> Result<()> {
        if let Some(writer) = self.inner.log.lock().as_mut() {
            writer.append(record)?;
        }
        Ok(())
    }
}

fn replacement(id: &Bson, update: Document) -> Result<Document> {
    if let Some(new_id) = update.get("_id") {
        if id_key(new_id) != id_key(id) {
            return Err(StoreError::Query(format!(
                "_id is immutable: cannot change {} to {}",
                id, new_id
            )));
        }
    }

    let mut doc = Document::new();
    doc.insert("_id", id.clone());
    for (key, value) in update {
        if key != "_id" {
            doc.insert(key, value);
        }
    }
    Ok(doc)
}

fn apply_update_operators(doc: &mut Document, update: &Document) -> Result<()> {
    for (op, operand) in update {
        let fields = match operand {
            Bson::Document(fields) => fields,
            _ => return Err(StoreError::Query(format!("{} expects a document", op))),
        };

        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(StoreError::Query("_id is immutable".to_string()));
            }
            match op.as_str() {
                "$set" => set_path(doc, path, value.clone())?,
                "$unset" => unset_path(doc, path),
                "$inc" => {
                    let parts: Vec<String> = path.split('.').map(str::to_string).collect();
                    let current = resolve_path(doc, &parts, false).first().cloned().cloned();
                    let next = increment(current.as_ref(), value)?;
                    set_path(doc, path, next)?;
                }
                other => {
                    return Err(StoreError::Query(format!(
                        "unknown update operator '{}'",
                        other
                    )))
                }
            }
        }
    }
    Ok(())
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(StoreError::Query(format!(
                    "cannot set '{}': '{}' is not a document",
                    path, head
                ))),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn increment(current: Option<&Bson>, by: &Bson) -> Result<Bson> {
    fn as_i64(value: &Bson) -> Option<i64> {
        match value {
            Bson::Int32(n) => Some(*n as i64),
            Bson::Int64(n) => Some(*n),
            _ => None,
        }
    }
    fn as_f64(value: &Bson) -> Option<f64> {
        match value {
            Bson::Double(f) => Some(*f),
            other => as_i64(other).map(|n| n as f64),
        }
    }

    if as_f64(by).is_none() {
        return Err(StoreError::Query(format!("$inc expects a number, got {}", by)));
    }

    match current {
        None => Ok(by.clone()),
        Some(Bson::Int32(a)) if matches!(by, Bson::Int32(_)) => {
            let b = as_i64(by).unwrap_or(0);
            Ok(match i32::try_from(*a as i64 + b) {
                Ok(n) => Bson::Int32(n),
                Err(_) => Bson::Int64(*a as i64 + b),
            })
        }
        Some(value) => match (as_i64(value), as_i64(by)) {
            (Some(a), Some(b)) => a
                .checked_add(b)
                .map(Bson::Int64)
                .ok_or_else(|| StoreError::Query("$inc overflowed a 64-bit integer".to_string())),
            _ => match as_f64(value) {
                Some(a) => Ok(Bson::Double(a + as_f64(by).unwrap_or(0.0))),
                None => Err(StoreError::Query(format!("cannot $inc non-numeric value {}", value))),
            },
        },
    }
}
