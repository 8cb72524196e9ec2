//! Session state and its persisted store
//!
//! The [`SessionStore`] is the only shared mutable state of the client. Every
//! change is committed as a whole: all persisted keys are written in one
//! batch, then the complete new [`Session`] snapshot is published, so readers
//! never see a new access token next to a stale role.

use std::fmt;
use std::sync::Arc;

use common::error::StorageResult;
use common::storage::{KeyValueStorage, MemoryStorage, StorageEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Storage key of the access token
pub const KEY_TOKEN: &str = "token";
/// Storage key of the refresh token
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
/// Storage key of the cached role
pub const KEY_ROLE: &str = "role";
/// Storage key of the logged-in flag ("true" or absent)
pub const KEY_IS_LOGGED_IN: &str = "isLoggedIn";
/// Storage key of the first-login flag ("true" or absent)
pub const KEY_FIRST_LOGIN: &str = "firstLogin";

const ALL_KEYS: [&str; 5] = [
    KEY_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_ROLE,
    KEY_IS_LOGGED_IN,
    KEY_FIRST_LOGIN,
];

/// Scope granted to regular library members
pub const ROLE_USER: &str = "ROLE_USER";
/// Scope granted to administrators
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// Coarse authorization tag attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Role of a visitor without a session
    pub const GUEST: &'static str = "guest";

    pub fn new(role: impl Into<String>) -> Self {
        Role(role.into())
    }

    pub fn guest() -> Self {
        Role(Self::GUEST.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0 == Self::GUEST
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::guest()
    }
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        Role::new(role)
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        Role(role)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted authentication state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Role,
    pub logged_in: bool,
    /// Set after a first login until the forced password change completes
    pub first_login: bool,
}

impl Session {
    /// A fully authenticated session
    pub fn authenticated(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        role: Role,
    ) -> Self {
        Session {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            role,
            logged_in: true,
            first_login: false,
        }
    }

    /// Both tokens are present and non-empty
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// Enforce the session invariant: missing tokens mean a logged-out guest
    pub fn normalized(mut self) -> Self {
        self.access_token = self.access_token.filter(|t| !t.is_empty());
        self.refresh_token = self.refresh_token.filter(|t| !t.is_empty());

        if !self.has_tokens() {
            self.logged_in = false;
            self.role = Role::guest();
        }
        if self.role.as_str().is_empty() {
            self.role = Role::guest();
        }
        self
    }

    fn to_entries(&self) -> Vec<StorageEntry> {
        let flag = |set: bool| set.then(|| "true".to_string());

        vec![
            (KEY_TOKEN.to_string(), self.access_token.clone()),
            (KEY_REFRESH_TOKEN.to_string(), self.refresh_token.clone()),
            (
                KEY_ROLE.to_string(),
                (!self.role.is_guest()).then(|| self.role.to_string()),
            ),
            (KEY_IS_LOGGED_IN.to_string(), flag(self.logged_in)),
            (KEY_FIRST_LOGIN.to_string(), flag(self.first_login)),
        ]
    }

    async fn read_from(storage: &dyn KeyValueStorage) -> StorageResult<Self> {
        let session = Session {
            access_token: storage.get(KEY_TOKEN).await?,
            refresh_token: storage.get(KEY_REFRESH_TOKEN).await?,
            role: storage
                .get(KEY_ROLE)
                .await?
                .map(Role::from)
                .unwrap_or_default(),
            logged_in: storage.get(KEY_IS_LOGGED_IN).await?.as_deref() == Some("true"),
            first_login: storage.get(KEY_FIRST_LOGIN).await?.as_deref() == Some("true"),
        };
        Ok(session.normalized())
    }
}

struct StoreInner {
    storage: Arc<dyn KeyValueStorage>,
    state: watch::Sender<Session>,
    /// Serializes commits so each one is a read-modify-write of the latest state
    commit: Mutex<()>,
}

/// Injectable, persisted session state
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Load the session persisted in `storage`
    pub async fn load(storage: Arc<dyn KeyValueStorage>) -> StorageResult<Self> {
        let session = Session::read_from(storage.as_ref()).await?;
        info!(
            "Loaded session (logged_in: {}, role: {})",
            session.logged_in, session.role
        );
        Ok(Self::with_session(storage, session))
    }

    /// A store that only lives in memory, starting logged out
    pub fn in_memory() -> Self {
        Self::with_session(Arc::new(MemoryStorage::new()), Session::default())
    }

    fn with_session(storage: Arc<dyn KeyValueStorage>, session: Session) -> Self {
        let (state, _) = watch::channel(session);
        SessionStore {
            inner: Arc::new(StoreInner {
                storage,
                state,
                commit: Mutex::new(()),
            }),
        }
    }

    /// Snapshot of the current session
    pub fn get(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.state.borrow().refresh_token.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.state.borrow().logged_in
    }

    pub fn role(&self) -> Role {
        self.inner.state.borrow().role.clone()
    }

    /// Receiver notified with every committed session
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Replace the whole session
    pub async fn set(&self, session: Session) -> StorageResult<Session> {
        let _guard = self.inner.commit.lock().await;
        self.commit(session).await
    }

    /// Modify the latest session and commit the result
    pub async fn update<F>(&self, f: F) -> StorageResult<Session>
    where
        F: FnOnce(&mut Session),
    {
        let _guard = self.inner.commit.lock().await;
        let mut next = self.get();
        f(&mut next);
        self.commit(next).await
    }

    /// Remove every session field. Clearing an empty session is a no-op.
    ///
    /// The in-memory session is cleared even when the storage write fails.
    pub async fn clear(&self) -> StorageResult<()> {
        let _guard = self.inner.commit.lock().await;

        let was_logged_in = self.inner.state.borrow().logged_in;
        self.inner.state.send_replace(Session::default());

        let batch = ALL_KEYS.iter().map(|k| (k.to_string(), None)).collect();
        if let Err(e) = self.inner.storage.apply(batch).await {
            warn!("Failed to clear persisted session: {}", e);
            return Err(e);
        }

        if was_logged_in {
            info!("Session cleared");
        }
        Ok(())
    }

    async fn commit(&self, session: Session) -> StorageResult<Session> {
        let session = session.normalized();
        self.inner.storage.apply(session.to_entries()).await?;
        self.inner.state.send_replace(session.clone());
        debug!(
            "Committed session (logged_in: {}, role: {})",
            session.logged_in, session.role
        );
        Ok(session)
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.state.borrow();
        f.debug_struct("SessionStore")
            .field("logged_in", &session.logged_in)
            .field("role", &session.role)
            .finish()
    }
}
