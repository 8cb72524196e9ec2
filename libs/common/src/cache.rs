//! Redis-backed session storage
//!
//! This module provides a [`KeyValueStorage`] backend that keeps the
//! persisted session keys in Redis under a configurable key prefix.

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use tracing::info;

use crate::error::StorageResult;
use crate::storage::{KeyValueStorage, StorageEntry};

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Prefix prepended to every stored key
    pub key_prefix: String,
}

/// Session storage kept in Redis
pub struct RedisStorage {
    client: Client,
    key_prefix: String,
}

impl RedisStorage {
    /// Initialize a new Redis storage
    pub async fn new(config: &RedisConfig) -> StorageResult<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisStorage {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Get a connection from the client
    async fn get_connection(&self) -> StorageResult<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> StorageResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl KeyValueStorage for RedisStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.set(self.namespaced(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(self.namespaced(key)).await?;
        Ok(())
    }

    async fn apply(&self, batch: Vec<StorageEntry>) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &batch {
            match value {
                Some(value) => {
                    pipe.set(self.namespaced(key), value).ignore();
                }
                None => {
                    pipe.del(self.namespaced(key)).ignore();
                }
            }
        }

        let mut conn = self.get_connection().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
