//! Append-only collection files
//!
//! Every collection stored on disk is a single file holding a sequence of
//! BSON records. Records are replayed in order when the collection is opened.
//!
//! ## Record Layout
//!
//! Each record is one BSON document (self-delimiting, little-endian length
//! prefix) with an `op` field:
//!
//! - `put`: `{op, id, doc}` inserts or replaces the document with that `_id`
//! - `del`: `{op, id}` removes the document with that `_id`
//! - `idx`: `{op, name, keys, unique}` defines a secondary index

use crate::error::{Result, StoreError};
use bson::{doc, Bson, Document};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Largest record accepted when replaying (BSON document limit plus envelope)
const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024 + 1024;

/// Smallest valid BSON document: length prefix plus terminator
const MIN_RECORD_SIZE: usize = 5;

/// A single mutation recorded in a collection file
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Put { id: Bson, doc: Document },
    Delete { id: Bson },
    Index {
        name: String,
        keys: Document,
        unique: bool,
    },
}

impl LogRecord {
    fn to_document(&self) -> Document {
        match self {
            LogRecord::Put { id, doc } => doc! { "op": "put", "id": id.clone(), "doc": doc.clone() },
            LogRecord::Delete { id } => doc! { "op": "del", "id": id.clone() },
            LogRecord::Index { name, keys, unique } => doc! {
                "op": "idx",
                "name": name.as_str(),
                "keys": keys.clone(),
                "unique": *unique,
            },
        }
    }

    fn from_document(mut record: Document) -> std::result::Result<Self, String> {
        let op = record
            .get_str("op")
            .map_err(|_| "record has no 'op' field".to_string())?
            .to_string();

        match op.as_str() {
            "put" => {
                let id = record.remove("id").ok_or("put record has no 'id'")?;
                let doc = match record.remove("doc") {
                    Some(Bson::Document(doc)) => doc,
                    _ => return Err("put record has no 'doc'".to_string()),
                };
                Ok(LogRecord::Put { id, doc })
            }
            "del" => {
                let id = record.remove("id").ok_or("del record has no 'id'")?;
                Ok(LogRecord::Delete { id })
            }
            "idx" => {
                let name = record
                    .get_str("name")
                    .map_err(|_| "idx record has no 'name'")?
                    .to_string();
                let keys = record
                    .get_document("keys")
                    .map_err(|_| "idx record has no 'keys'")?
                    .clone();
                let unique = record.get_bool("unique").unwrap_or(false);
                Ok(LogRecord::Index { name, keys, unique })
            }
            other => Err(format!("unknown record op '{}'", other)),
        }
    }
}

/// Appends records to a collection file
pub struct LogWriter {
    file: BufWriter<File>,
    path: PathBuf,
    position: u64,
    unsynced_bytes: usize,
}

impl LogWriter {
    /// Open (or create) a collection file for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let position = file.metadata()?.len();

        debug!("Opened collection file {} at {} bytes", path.display(), position);

        Ok(Self {
            file: BufWriter::with_capacity(64 * 1024, file),
            path,
            position,
            unsynced_bytes: 0,
        })
    }

    /// Append a record, returning the offset it was written at
    pub fn append(&mut self, record: &LogRecord) -> Result<u64> {
        let mut encoded = Vec::new();
        record.to_document().to_writer(&mut encoded)?;

        let offset = self.position;
        self.file.write_all(&encoded)?;
        // Hand the record to the OS right away so a reopen sees it
        self.file.flush()?;
        self.position += encoded.len() as u64;
        self.unsynced_bytes += encoded.len();

        Ok(offset)
    }

    /// Flush pending writes to disk (fsync)
    pub fn sync(&mut self) -> Result<()> {
        if self.unsynced_bytes == 0 {
            return Ok(());
        }

        self.file.flush()?;
        self.file.get_ref().sync_data()?;

        debug!(
            "Synced {} ({} bytes since last sync)",
            self.path.display(),
            self.unsynced_bytes
        );
        self.unsynced_bytes = 0;

        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replays records from a collection file
pub struct LogReader {
    reader: BufReader<File>,
    path: PathBuf,
    position: u64,
    file_size: u64,
}

impl LogReader {
    /// Open a collection file for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            path,
            position: 0,
            file_size,
        })
    }

    /// Read the next record, `None` at end of file
    ///
    /// A record cut short by a crash at the end of the file is treated as end
    /// of file; anything malformed before that is reported as corruption.
    pub fn read_record(&mut self) -> Result<Option<LogRecord>> {
        let remaining = self.file_size.saturating_sub(self.position);
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < 4 {
            warn!(
                "Ignoring truncated record at end of {} (offset {})",
                self.path.display(),
                self.position
            );
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        self.reader.read_exact(&mut length_bytes)?;
        let length = i32::from_le_bytes(length_bytes);

        if length < MIN_RECORD_SIZE as i32 || length as usize > MAX_RECORD_SIZE {
            return Err(self.corrupted(format!("invalid record length {}", length)));
        }
        let length = length as usize;

        if (length as u64) > remaining {
            warn!(
                "Ignoring truncated record at end of {} (offset {}, {} of {} bytes)",
                self.path.display(),
                self.position,
                remaining,
                length
            );
            self.position = self.file_size;
            return Ok(None);
        }

        let mut bytes = vec![0u8; length];
        bytes[0..4].copy_from_slice(&length_bytes);
        self.reader.read_exact(&mut bytes[4..])?;

        let document = Document::from_reader(&bytes[..])
            .map_err(|e| self.corrupted(format!("undecodable record: {}", e)))?;
        let record = LogRecord::from_document(document).map_err(|reason| self.corrupted(reason))?;

        self.position += length as u64;
        Ok(Some(record))
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    fn corrupted(&self, reason: String) -> StoreError {
        StoreError::CorruptedLog {
            path: self.path.clone(),
            offset: self.position,
            reason,
        }
    }
}
