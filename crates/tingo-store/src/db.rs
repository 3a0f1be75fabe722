//! Database handle
//!
//! A database is a directory with one file per collection (or nothing at all
//! in memory mode). Collections are opened on first use and shared by every
//! caller asking for the same name.

use crate::collection::Collection;
use crate::error::{Result, StoreError};
use crate::options::StoreOptions;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum collection name length in bytes
const MAX_COLLECTION_NAME_LEN: usize = 120;

struct DbInner {
    path: PathBuf,
    options: StoreOptions,
    collections: RwLock<HashMap<String, Collection>>,
    closed: Arc<AtomicBool>,
}

/// Handle to an open database; cheap to clone
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    /// Open the database at `path`, creating the directory when needed
    ///
    /// In memory mode the path is only used for diagnostics.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !options.mem_store {
            fs::create_dir_all(&path)?;
        }

        info!(
            "Opened database at {} (in memory: {}, identifiers: {:?})",
            path.display(),
            options.mem_store,
            options.identifier
        );

        Ok(Self {
            inner: Arc::new(DbInner {
                path,
                options,
                collections: RwLock::new(HashMap::new()),
                closed: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    /// Get a collection, loading it from disk on first use
    pub fn collection(&self, name: &str) -> Result<Collection> {
        self.check_open()?;
        validate_collection_name(name)?;

        if let Some(collection) = self.inner.collections.read().get(name) {
            return Ok(collection.clone());
        }

        let mut collections = self.inner.collections.write();
        // Another caller may have opened it between the two locks
        if let Some(collection) = collections.get(name) {
            return Ok(collection.clone());
        }

        let file = if self.inner.options.mem_store {
            None
        } else {
            Some(self.inner.path.join(name))
        };
        let collection = Collection::open(
            name,
            file,
            self.inner.options.clone(),
            self.inner.closed.clone(),
        )?;
        debug!("Opened collection '{}'", name);

        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Flush every collection file and refuse further operations
    ///
    /// Closing an already closed database is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let collections: Vec<Collection> = self.inner.collections.read().values().cloned().collect();
        let mut first_error = None;
        for collection in collections {
            if let Err(e) = collection.sync() {
                warn!("Failed to sync collection '{}': {}", collection.name(), e);
                first_error.get_or_insert(e);
            }
        }

        info!("Closed database at {}", self.inner.path.display());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.inner.path)
            .field("options", &self.inner.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Collection names double as file names
fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidName("collection name cannot be empty".to_string()));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(StoreError::InvalidName(format!(
            "collection name exceeds {} bytes",
            MAX_COLLECTION_NAME_LEN
        )));
    }
    if name.starts_with('.') {
        return Err(StoreError::InvalidName(format!(
            "collection name cannot start with '.': {}",
            name
        )));
    }
    if name.contains(['/', '\\', '\0', '$']) {
        return Err(StoreError::InvalidName(format!(
            "collection name contains an invalid character: {}",
            name
        )));
    }
    Ok(())
}
