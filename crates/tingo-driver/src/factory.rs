//! Driver construction from a configuration set

use crate::config::DriverConfig;
use crate::driver::TingoDriver;
use std::sync::Arc;
use tingo_common::{DriverError, Result};
use tingo_store::Db;
use tracing::info;

/// Validate `config`, open the store and return a driver bound to it
///
/// Nothing is created on disk when validation fails.
pub async fn create(config: DriverConfig) -> Result<TingoDriver> {
    config.validate()?;

    let options = config.store_options();
    let identifier = options.identifier;
    let path = config.path.clone();

    let db = tokio::task::spawn_blocking(move || Db::open(&path, options))
        .await
        .map_err(|e| DriverError::store("task", format!("store task failed: {}", e)))??;

    info!(
        "Created tingo driver at {} (in memory: {}, identifiers: {:?}, search in array: {})",
        config.path, config.mem_store, identifier, config.search_in_array
    );

    Ok(TingoDriver::new(Arc::new(db), identifier))
}

/// [`create`] from a JSON configuration set
pub async fn create_from_json(json: &str) -> Result<TingoDriver> {
    create(DriverConfig::from_json(json)?).await
}
