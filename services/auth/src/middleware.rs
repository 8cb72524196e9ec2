//! Client middleware chain and credential attachment
//!
//! A request travels through the middlewares in the order they were added to
//! the [`ApiClient`], then reaches the [`Transport`]. Each middleware gets the
//! request and a [`Next`] handle it may call zero, one or several times.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientResult;
use crate::http::{ApiRequest, ApiResponse, Transport};
use crate::session::SessionStore;

/// A step of the outbound pipeline: `(request, next) -> response`
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> ClientResult<ApiResponse>;
}

/// The remainder of the pipeline after the current middleware
///
/// `Next` is `Copy`, so a middleware can run the rest of the chain again,
/// e.g. to replay a request.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain
    pub async fn run(self, request: ApiRequest) -> ClientResult<ApiResponse> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middlewares: rest,
                    transport: self.transport,
                };
                current.handle(request, next).await
            }
            None => self.transport.send(&request).await,
        }
    }
}

/// HTTP client with an explicit middleware chain
#[derive(Clone)]
pub struct ApiClient {
    middlewares: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        ApiClient {
            middlewares: Vec::new(),
            transport,
        }
    }

    /// Append a middleware; earlier middlewares wrap later ones
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Send a request through the chain, returning the raw response
    pub async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let next = Next {
            middlewares: &self.middlewares,
            transport: self.transport.as_ref(),
        };
        next.run(request).await
    }

    /// Send a request and fail on non-success statuses
    pub async fn execute(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        self.send(request).await?.error_for_status()
    }

    /// Send a request and decode a successful JSON body
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        self.execute(request).await?.json()
    }

    /// The transport at the end of the chain
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }
}

/// Attach the current access token to requests that require authorization
///
/// Requests without the flag, or sent while no token is stored, go out
/// unmodified and the backend decides. A bearer already pinned on the
/// request is kept.
pub fn attach_credentials(request: &mut ApiRequest, access_token: Option<&str>) -> ClientResult<()> {
    if !request.requires_auth || request.bearer().is_some() {
        return Ok(());
    }
    if let Some(token) = access_token {
        request.set_bearer(token)?;
    }
    Ok(())
}

/// Middleware reading the access token from the [`SessionStore`]
#[derive(Clone)]
pub struct CredentialAttacher {
    store: SessionStore,
}

impl CredentialAttacher {
    pub fn new(store: SessionStore) -> Self {
        CredentialAttacher { store }
    }
}

#[async_trait]
impl Middleware for CredentialAttacher {
    async fn handle(&self, mut request: ApiRequest, next: Next<'_>) -> ClientResult<ApiResponse> {
        let token = self.store.access_token();
        if request.requires_auth && token.is_none() {
            debug!(
                "No access token for {} {}, sending unauthenticated",
                request.method, request.path
            );
        }
        attach_credentials(&mut request, token.as_deref())?;
        next.run(request).await
    }
}
