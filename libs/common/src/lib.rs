//! Common library for the library-loan client
//!
//! This crate provides shared functionality used by the client crates,
//! including configuration loading, error handling, and the key/value
//! backends the session state is persisted in.

use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;

use crate::cache::{RedisConfig, RedisStorage};
use crate::config::{ClientConfig, StorageBackend};
use crate::error::StorageResult;
use crate::storage::{FileStorage, KeyValueStorage, MemoryStorage};

/// Open the storage backend selected by the configuration
///
/// ```rust,no_run
/// use common::{config::ClientConfig, open_storage};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::load()?;
///     let storage = open_storage(&config).await?;
///     println!("Stored token: {:?}", storage.get("token").await?);
///     Ok(())
/// }
/// ```
pub async fn open_storage(config: &ClientConfig) -> StorageResult<Arc<dyn KeyValueStorage>> {
    let storage: Arc<dyn KeyValueStorage> = match config.storage_backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::File => Arc::new(FileStorage::open(&config.storage_path).await?),
        StorageBackend::Redis => {
            let redis_config = RedisConfig {
                url: config.redis_url.clone(),
                key_prefix: config.redis_key_prefix.clone(),
            };
            Arc::new(RedisStorage::new(&redis_config).await?)
        }
    };

    Ok(storage)
}
