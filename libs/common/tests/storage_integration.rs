//! Integration tests for the storage backends
//!
//! These tests verify that the configured backend can be opened and keeps
//! the session keys across handles.

use common::{
    config::{ClientConfig, StorageBackend},
    error::StorageError,
    open_storage,
};

fn config_for(backend: StorageBackend, storage_path: String) -> ClientConfig {
    ClientConfig {
        api_base_url: "http://localhost:9000/api".to_string(),
        request_timeout_secs: 30,
        refresh_timeout_secs: 10,
        validation_interval_secs: 60,
        storage_backend: backend,
        storage_path,
        redis_url: "redis://localhost:6379".to_string(),
        redis_key_prefix: "library:session:".to_string(),
    }
}

/// Keys written through one handle are visible to a freshly opened one
#[tokio::test]
async fn test_file_backend_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::temp_dir().join(format!("session-{}.json", uuid::Uuid::new_v4()));
    let config = config_for(StorageBackend::File, path.display().to_string());

    let storage = open_storage(&config).await?;
    storage
        .apply(vec![
            ("token".to_string(), Some("A".to_string())),
            ("isLoggedIn".to_string(), Some("true".to_string())),
        ])
        .await?;

    let reopened = open_storage(&config).await?;
    assert_eq!(reopened.get("token").await?, Some("A".to_string()));
    assert_eq!(reopened.get("isLoggedIn").await?, Some("true".to_string()));

    tokio::fs::remove_file(&path).await?;
    Ok(())
}

/// Memory handles do not share state
#[tokio::test]
async fn test_memory_backend_is_per_handle() -> Result<(), Box<dyn std::error::Error>> {
    let config = config_for(StorageBackend::Memory, String::new());

    let first = open_storage(&config).await?;
    first.set("token", "A").await?;

    let second = open_storage(&config).await?;
    assert_eq!(second.get("token").await?, None);
    Ok(())
}

/// The Redis backend takes its URL from the client configuration
#[tokio::test]
async fn test_redis_backend_reads_client_config() {
    let mut config = config_for(StorageBackend::Redis, String::new());
    config.redis_url = "not a redis url".to_string();

    let result = open_storage(&config).await;
    assert!(matches!(result, Err(StorageError::Redis(_))));
}
