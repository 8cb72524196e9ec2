//! In-process stand-in for the library backend

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use auth::error::ClientResult;
use auth::http::{ApiRequest, ApiResponse, Transport};
use auth::session::{ROLE_USER, Role, Session, SessionStore};
use auth::{AuthClient, RefreshCoordinator};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub path: String,
    pub bearer: Option<String>,
}

struct BackendState {
    valid_token: String,
    refresh_reply: (StatusCode, Value),
    login_reply: (StatusCode, Value),
    logout_status: StatusCode,
    reject_all: bool,
}

/// Answers like the backend: protected paths accept only the current valid
/// access token, and a successful refresh makes the new one valid.
pub struct MockBackend {
    state: Mutex<BackendState>,
    hits: Mutex<Vec<Hit>>,
    refresh_calls: AtomicUsize,
    gate_refresh: AtomicBool,
    refresh_gate: Notify,
}

impl MockBackend {
    pub fn new(valid_token: &str) -> Arc<Self> {
        Arc::new(MockBackend {
            state: Mutex::new(BackendState {
                valid_token: valid_token.to_string(),
                refresh_reply: (
                    StatusCode::OK,
                    json!({"access_token": "B", "refresh_token": "R2"}),
                ),
                login_reply: (StatusCode::UNAUTHORIZED, json!({"message": "Bad credentials"})),
                logout_status: StatusCode::NO_CONTENT,
                reject_all: false,
            }),
            hits: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            gate_refresh: AtomicBool::new(false),
            refresh_gate: Notify::new(),
        })
    }

    pub fn set_refresh_reply(&self, status: StatusCode, body: Value) {
        self.state.lock().unwrap().refresh_reply = (status, body);
    }

    pub fn set_login_reply(&self, status: StatusCode, body: Value) {
        self.state.lock().unwrap().login_reply = (status, body);
    }

    pub fn set_logout_status(&self, status: StatusCode) {
        self.state.lock().unwrap().logout_status = status;
    }

    /// Refuse every access token, even freshly refreshed ones
    pub fn reject_all(&self) {
        self.state.lock().unwrap().reject_all = true;
    }

    /// Hold refresh calls until [`MockBackend::release_refresh`]
    pub fn gate_refresh(&self) {
        self.gate_refresh.store(true, Ordering::SeqCst);
    }

    pub fn release_refresh(&self) {
        self.refresh_gate.notify_one();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn hits_for(&self, path: &str) -> Vec<Hit> {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|hit| hit.path == path)
            .cloned()
            .collect()
    }

    fn login_reply(&self) -> (StatusCode, Value) {
        self.state.lock().unwrap().login_reply.clone()
    }

    fn logout_status(&self) -> StatusCode {
        self.state.lock().unwrap().logout_status
    }

    fn authorize(&self, bearer: Option<&str>) -> bool {
        let state = self.state.lock().unwrap();
        !state.reject_all && bearer == Some(state.valid_token.as_str())
    }

    /// Validity of the token named in the body, not of the bearer
    fn introspect_reply(&self, request: &ApiRequest) -> (StatusCode, Value) {
        let asked = request
            .body
            .as_ref()
            .and_then(|body| body.get("token"))
            .and_then(Value::as_str);
        let state = self.state.lock().unwrap();
        let valid = asked == Some(state.valid_token.as_str());
        (StatusCode::OK, json!({ "valid": valid }))
    }

    async fn refresh(&self) -> (StatusCode, Value) {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.gate_refresh.load(Ordering::SeqCst) {
            self.refresh_gate.notified().await;
        }

        self.complete_refresh()
    }

    fn complete_refresh(&self) -> (StatusCode, Value) {
        let mut state = self.state.lock().unwrap();
        let (status, body) = state.refresh_reply.clone();
        if status.is_success() {
            if let Some(token) = body.get("access_token").and_then(Value::as_str) {
                state.valid_token = token.to_string();
            }
        }
        (status, body)
    }
}

#[async_trait]
impl Transport for MockBackend {
    async fn send(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let bearer = request.bearer().map(str::to_string);
        self.hits.lock().unwrap().push(Hit {
            path: request.path.clone(),
            bearer: bearer.clone(),
        });

        let (status, body) = match request.path.as_str() {
            "/common/auth/login" => self.login_reply(),
            "/common/auth/refresh" => self.refresh().await,
            "/common/auth/logout" => (self.logout_status(), Value::Null),
            "/common/books" => (StatusCode::OK, json!([])),
            "/common/auth/introspect" if self.authorize(bearer.as_deref()) => {
                self.introspect_reply(request)
            }
            _ if self.authorize(bearer.as_deref()) => {
                (StatusCode::OK, json!({"bearer": bearer}))
            }
            _ => (StatusCode::UNAUTHORIZED, json!({"message": "Unauthorized"})),
        };
        Ok(ApiResponse::new(status, body))
    }
}

/// A pipeline whose store holds `{token: A, refresh_token: R, role: ROLE_USER}`
pub async fn logged_in_client(backend: Arc<MockBackend>, refresh_timeout: Duration) -> AuthClient {
    let store = SessionStore::in_memory();
    store
        .set(Session::authenticated("A", "R", Role::new(ROLE_USER)))
        .await
        .unwrap();
    AuthClient::new(backend, store, refresh_timeout)
}

/// Wait until `len` callers are queued behind the in-flight refresh
pub async fn wait_for_queue(coordinator: &RefreshCoordinator, len: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.queued() < len {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("requests never queued behind the refresh");
}
