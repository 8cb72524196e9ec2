//! Application state shared by every screen

use std::sync::Arc;

use auth::http::{ReqwestTransport, Transport};
use auth::session::SessionStore;
use auth::validator::{ValidationOutcome, ValidatorHandle};
use auth::{AuthApi, AuthClient};
use common::config::ClientConfig;
use common::open_storage;
use tracing::info;

use crate::error::AppResult;
use crate::library::LibraryApi;
use crate::routes::{self, Navigation};

#[derive(Clone)]
pub struct AppState {
    pub config: ClientConfig,
    auth: AuthClient,
    library: LibraryApi,
}

impl AppState {
    /// Open the configured session storage and connect to the backend
    pub async fn from_config(config: ClientConfig) -> AppResult<Self> {
        let storage = open_storage(&config).await?;
        let store = SessionStore::load(storage).await?;
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())?;
        info!("Using backend at {}", transport.base_url());

        Ok(Self::new(config, Arc::new(transport), store))
    }

    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, store: SessionStore) -> Self {
        let auth = AuthClient::new(transport, store, config.refresh_timeout());
        let library = LibraryApi::new(auth.client().clone());
        AppState {
            config,
            auth,
            library,
        }
    }

    pub fn store(&self) -> &SessionStore {
        self.auth.store()
    }

    pub fn auth(&self) -> &AuthApi {
        self.auth.auth()
    }

    pub fn library(&self) -> &LibraryApi {
        &self.library
    }

    /// Resolve `path` against the current session
    pub fn navigate(&self, path: &str) -> Navigation {
        routes::resolve(path, &self.store().get())
    }

    /// A single validation pass
    pub async fn validate(&self) -> AppResult<ValidationOutcome> {
        Ok(self.auth.validator().validate().await?)
    }

    /// Validate the session now and then on the configured interval
    pub async fn start_validator(&self) -> AppResult<ValidatorHandle> {
        let handle = self
            .auth
            .validator()
            .start(self.config.validation_interval())
            .await?;
        Ok(handle)
    }
}
