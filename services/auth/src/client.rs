//! Wiring of the authenticated request pipeline

use std::sync::Arc;
use std::time::Duration;

use crate::api::{AuthApi, HttpTokenRefresher};
use crate::http::Transport;
use crate::middleware::{ApiClient, CredentialAttacher};
use crate::refresh::{RefreshCoordinator, RefreshMiddleware, TokenRefresher};
use crate::session::SessionStore;
use crate::validator::SessionValidator;

/// A session store, its refresh coordinator and the client chain built on both
///
/// The chain is `RefreshMiddleware -> CredentialAttacher -> transport`, so a
/// replayed request picks up the freshly stored access token.
#[derive(Clone)]
pub struct AuthClient {
    store: SessionStore,
    coordinator: RefreshCoordinator,
    client: ApiClient,
    auth: AuthApi,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>, store: SessionStore, refresh_timeout: Duration) -> Self {
        let refresher = Arc::new(HttpTokenRefresher::new(transport.clone()));
        Self::with_refresher(transport, store, refresher, refresh_timeout)
    }

    /// Build the pipeline around a custom refresh-token exchange
    pub fn with_refresher(
        transport: Arc<dyn Transport>,
        store: SessionStore,
        refresher: Arc<dyn TokenRefresher>,
        refresh_timeout: Duration,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(store.clone(), refresher, refresh_timeout);
        let client = ApiClient::new(transport)
            .with(RefreshMiddleware::new(coordinator.clone()))
            .with(CredentialAttacher::new(store.clone()));
        let auth = AuthApi::new(client.clone(), store.clone());

        AuthClient {
            store,
            coordinator,
            client,
            auth,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// The full middleware chain
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    /// A validator sharing this pipeline's refresh coordinator
    pub fn validator(&self) -> SessionValidator {
        SessionValidator::new(self.auth.clone(), self.coordinator.clone())
    }
}
