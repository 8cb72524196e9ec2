//! Single-flight access token refresh
//!
//! The [`RefreshCoordinator`] is an explicit two-state machine:
//!
//! - `Idle`: no exchange is running, the queue is empty.
//! - `Refreshing`: one refresh-token exchange is in flight; every other
//!   caller that needs a fresh token is queued behind it.
//!
//! The first caller to find the coordinator idle starts the exchange. When it
//! completes the new tokens are committed to the [`SessionStore`] first, then
//! the starter and every queued caller (in arrival order) receive the same
//! outcome. A failed exchange clears the session unless the backend was only
//! temporarily unavailable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ClientResult, RefreshError};
use crate::http::{ApiRequest, ApiResponse};
use crate::middleware::{Middleware, Next, attach_credentials};
use crate::session::SessionStore;

/// Access/refresh token pair returned by the refresh endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// The refresh-token exchange itself
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError>;
}

/// What the caller of [`RefreshCoordinator::on_auth_failure`] should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// A new access token is stored; re-issue the request once with it
    Replay { access_token: String },
    /// The failure is not a recoverable authorization failure; surface it
    NotApplicable,
}

type RefreshOutcome = Result<TokenPair, RefreshError>;

/// A caller suspended behind the in-flight exchange
struct PendingRequest {
    request_id: Option<Uuid>,
    resolve: oneshot::Sender<RefreshOutcome>,
}

enum CycleState {
    Idle,
    Refreshing { queue: Vec<PendingRequest> },
}

struct CoordinatorInner {
    store: SessionStore,
    refresher: Arc<dyn TokenRefresher>,
    timeout: Duration,
    state: Mutex<CycleState>,
    exchanges: AtomicU64,
}

/// Guarantees at most one refresh-token exchange in flight
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RefreshCoordinator {
    /// `timeout` bounds a single exchange; hitting it counts as a failure
    pub fn new(store: SessionStore, refresher: Arc<dyn TokenRefresher>, timeout: Duration) -> Self {
        RefreshCoordinator {
            inner: Arc::new(CoordinatorInner {
                store,
                refresher,
                timeout,
                state: Mutex::new(CycleState::Idle),
                exchanges: AtomicU64::new(0),
            }),
        }
    }

    /// Entry point for a failed response.
    ///
    /// Only an auth-required request answered with 401 that has not been
    /// replayed yet is recoverable; anything else is `NotApplicable`. A 401
    /// for a token that has since been replaced is replayed with the stored
    /// token without another exchange.
    pub async fn on_auth_failure(
        &self,
        request: &ApiRequest,
        response: &ApiResponse,
    ) -> Result<Recovery, RefreshError> {
        if !request.requires_auth
            || response.status != StatusCode::UNAUTHORIZED
            || request.is_retried()
        {
            return Ok(Recovery::NotApplicable);
        }

        if let (Some(sent), Some(current)) = (request.bearer(), self.inner.store.access_token()) {
            if sent != current {
                debug!(
                    "Request {} was sent with a replaced access token, replaying",
                    request.id()
                );
                return Ok(Recovery::Replay {
                    access_token: current,
                });
            }
        }

        debug!(
            "Request {} ({} {}) unauthorized, refreshing session",
            request.id(),
            request.method,
            request.path
        );
        let tokens = self.refresh_for(Some(request.id())).await?;
        Ok(Recovery::Replay {
            access_token: tokens.access_token,
        })
    }

    /// Exchange the stored refresh token, joining an exchange already in flight
    pub async fn refresh_session(&self) -> Result<TokenPair, RefreshError> {
        self.refresh_for(None).await
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), CycleState::Refreshing { .. })
    }

    /// Number of callers waiting on the in-flight exchange
    pub fn queued(&self) -> usize {
        match &*self.lock_state() {
            CycleState::Idle => 0,
            CycleState::Refreshing { queue } => queue.len(),
        }
    }

    /// Number of exchanges started since creation
    pub fn exchanges(&self) -> u64 {
        self.inner.exchanges.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, CycleState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh_for(&self, request_id: Option<Uuid>) -> RefreshOutcome {
        let waiter = {
            let mut state = self.lock_state();
            match &mut *state {
                CycleState::Refreshing { queue } => {
                    let (resolve, rx) = oneshot::channel();
                    queue.push(PendingRequest {
                        request_id,
                        resolve,
                    });
                    debug!("Queued behind in-flight refresh (position {})", queue.len());
                    Some(rx)
                }
                CycleState::Idle => {
                    *state = CycleState::Refreshing { queue: Vec::new() };
                    None
                }
            }
        };

        match waiter {
            Some(rx) => rx.await.unwrap_or(Err(RefreshError::Abandoned)),
            None => {
                // The cycle owns its own task so a cancelled starter cannot
                // strand the queue.
                let coordinator = self.clone();
                let cycle = tokio::spawn(async move { coordinator.run_cycle().await });
                cycle.await.unwrap_or(Err(RefreshError::Abandoned))
            }
        }
    }

    async fn run_cycle(&self) -> RefreshOutcome {
        let mut guard = CycleGuard {
            coordinator: self,
            finished: false,
        };

        let outcome = self.exchange().await;

        guard.finished = true;
        let queue = self.finish_cycle();
        if !queue.is_empty() {
            info!("Resolving {} queued request(s) after refresh", queue.len());
        }
        for pending in queue {
            if pending.resolve.send(outcome.clone()).is_err() {
                debug!(
                    "Queued caller {:?} went away before refresh completed",
                    pending.request_id
                );
            }
        }

        outcome
    }

    /// Return to `Idle`, handing back whoever was queued
    fn finish_cycle(&self) -> Vec<PendingRequest> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, CycleState::Idle) {
            CycleState::Refreshing { queue } => queue,
            CycleState::Idle => Vec::new(),
        }
    }

    async fn exchange(&self) -> RefreshOutcome {
        let store = &self.inner.store;
        self.inner.exchanges.fetch_add(1, Ordering::SeqCst);

        let result = match store.refresh_token() {
            None => Err(RefreshError::MissingRefreshToken),
            Some(refresh_token) => {
                info!("Refreshing access token");
                match tokio::time::timeout(
                    self.inner.timeout,
                    self.inner.refresher.refresh(&refresh_token),
                )
                .await
                {
                    Ok(Ok(tokens)) => self.commit(&refresh_token, tokens).await,
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(RefreshError::Timeout(self.inner.timeout)),
                }
            }
        };

        match result {
            Ok(tokens) => {
                info!("Access token refreshed");
                Ok(tokens)
            }
            Err(e) if e.clears_session() => {
                warn!("Session refresh failed, logging out: {}", e);
                if let Err(clear_err) = store.clear().await {
                    error!("Failed to clear session after refresh failure: {}", clear_err);
                }
                Err(e)
            }
            Err(e) => {
                warn!("Session refresh deferred, keeping session: {}", e);
                Err(e)
            }
        }
    }

    /// Store the new tokens before any caller is released
    async fn commit(&self, used_refresh_token: &str, tokens: TokenPair) -> RefreshOutcome {
        let mut superseded = false;
        self.inner
            .store
            .update(|session| {
                if session.refresh_token.as_deref() != Some(used_refresh_token) {
                    superseded = true;
                    return;
                }
                session.access_token = Some(tokens.access_token.clone());
                session.refresh_token = Some(tokens.refresh_token.clone());
                session.logged_in = true;
            })
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        if superseded {
            return Err(RefreshError::Superseded);
        }
        Ok(tokens)
    }
}

/// Releases the queue if the cycle task dies before finishing
struct CycleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    finished: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        for pending in self.coordinator.finish_cycle() {
            let _ = pending.resolve.send(Err(RefreshError::Abandoned));
        }
    }
}

/// Middleware recovering auth-required requests from an expired access token
///
/// Place it before [`crate::middleware::CredentialAttacher`]. Each attempt is
/// pinned to the token stored when it starts, so a late 401 can be told
/// apart from one for the current token.
#[derive(Clone)]
pub struct RefreshMiddleware {
    coordinator: RefreshCoordinator,
}

impl RefreshMiddleware {
    pub fn new(coordinator: RefreshCoordinator) -> Self {
        RefreshMiddleware { coordinator }
    }
}

#[async_trait]
impl Middleware for RefreshMiddleware {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> ClientResult<ApiResponse> {
        if !request.requires_auth || request.is_retried() {
            return next.run(request).await;
        }

        let mut request = request;
        attach_credentials(&mut request, self.coordinator.inner.store.access_token().as_deref())?;

        let response = next.run(request.clone()).await?;
        match self.coordinator.on_auth_failure(&request, &response).await? {
            Recovery::NotApplicable => Ok(response),
            Recovery::Replay { access_token } => {
                let mut replay = request;
                replay.mark_retried();
                replay.set_bearer(&access_token)?;
                debug!("Replaying request {} after refresh", replay.id());
                next.run(replay).await
            }
        }
    }
}
