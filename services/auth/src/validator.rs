//! Periodic session validation
//!
//! Keeps `logged_in` consistent with the backend's view of the session,
//! independent of request traffic. A pass introspects the stored access
//! token and falls back to the shared refresh coordinator when it is no
//! longer valid. Backend unavailability never ends the session; the next
//! scheduled pass simply tries again.

use std::sync::Arc;
use std::time::Duration;

use common::error::StorageError;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::AuthApi;
use crate::error::{ClientError, RefreshError, is_unavailable};
use crate::refresh::RefreshCoordinator;
use crate::session::SessionStore;

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

pub type ValidatorResult<T> = Result<T, ValidatorError>;

/// Result of a single validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// A token was missing; the session was cleared
    NoSession,
    /// First-login session waiting for its password change; left alone
    PasswordChangePending,
    /// The access token is valid
    Valid,
    /// The access token was invalid and has been refreshed
    Refreshed,
    /// The session could not be recovered and was cleared
    LoggedOut,
    /// The backend was unavailable; the session is untouched
    Deferred,
}

/// Background validator of the stored session
#[derive(Clone)]
pub struct SessionValidator {
    auth: AuthApi,
    coordinator: RefreshCoordinator,
    running: Arc<Mutex<()>>,
}

impl SessionValidator {
    pub fn new(auth: AuthApi, coordinator: RefreshCoordinator) -> Self {
        SessionValidator {
            auth,
            coordinator,
            running: Arc::new(Mutex::new(())),
        }
    }

    fn store(&self) -> &SessionStore {
        self.auth.store()
    }

    /// Run one validation pass
    pub async fn validate(&self) -> ValidatorResult<ValidationOutcome> {
        let session = self.store().get();

        if session.first_login {
            debug!("Session awaits its first password change, skipping validation");
            return Ok(ValidationOutcome::PasswordChangePending);
        }
        if !session.has_tokens() {
            debug!("No complete session stored");
            self.store().clear().await?;
            return Ok(ValidationOutcome::NoSession);
        }

        let result = self.auth.introspect().await;
        // An expired token is refreshed by the introspection request itself;
        // its answer then concerns the replaced token.
        let rotated = self
            .store()
            .access_token()
            .is_some_and(|current| session.access_token.as_deref() != Some(current.as_str()));

        match result {
            Ok(true) => {
                // The role cached at login stays authoritative.
                self.store().update(|s| s.logged_in = true).await?;
                Ok(if rotated {
                    ValidationOutcome::Refreshed
                } else {
                    ValidationOutcome::Valid
                })
            }
            Ok(false) if rotated => {
                debug!("Access token was refreshed during introspection");
                Ok(ValidationOutcome::Refreshed)
            }
            Ok(false) => {
                info!("Access token no longer valid, refreshing");
                Ok(self.recover().await)
            }
            Err(e) => Ok(self.on_introspection_error(e, rotated).await),
        }
    }

    async fn on_introspection_error(&self, e: ClientError, rotated: bool) -> ValidationOutcome {
        match e {
            ClientError::Transport(reason) => {
                warn!("Backend unreachable, keeping session: {}", reason);
                ValidationOutcome::Deferred
            }
            ClientError::Status { status, .. } if is_unavailable(status) => {
                warn!("Backend unavailable ({}), keeping session", status);
                ValidationOutcome::Deferred
            }
            // The request path already ran the refresh; its outcome decides.
            ClientError::Refresh(e) => Self::refresh_outcome(&e),
            other if rotated => {
                warn!("Introspection failed after a refresh, keeping new tokens: {}", other);
                ValidationOutcome::Refreshed
            }
            other => {
                warn!("Introspection failed, treating token as invalid: {}", other);
                self.recover().await
            }
        }
    }

    async fn recover(&self) -> ValidationOutcome {
        match self.coordinator.refresh_session().await {
            Ok(_) => ValidationOutcome::Refreshed,
            Err(e) => Self::refresh_outcome(&e),
        }
    }

    fn refresh_outcome(e: &RefreshError) -> ValidationOutcome {
        if e.clears_session() {
            ValidationOutcome::LoggedOut
        } else {
            debug!("Refresh deferred: {}", e);
            ValidationOutcome::Deferred
        }
    }

    /// Validate now, then every `interval` until the handle is shut down.
    ///
    /// A tick that fires while the previous pass still runs is skipped.
    pub async fn start(&self, interval: Duration) -> ValidatorResult<ValidatorHandle> {
        let initial = self.validate().await?;
        info!("Initial session validation: {:?}", initial);

        let scheduler = JobScheduler::new().await?;
        let validator = self.clone();
        let job = Job::new_repeated_async(interval, move |_, _| {
            let validator = validator.clone();
            Box::pin(async move {
                let Ok(_pass) = validator.running.try_lock() else {
                    debug!("Previous validation still running, skipping tick");
                    return;
                };
                match validator.validate().await {
                    Ok(outcome) => debug!("Session validation: {:?}", outcome),
                    Err(e) => error!("Session validation failed: {}", e),
                }
            })
        })?;

        let job_id = scheduler.add(job).await?;
        scheduler.start().await?;
        info!("Started session validator every {:?}", interval);

        Ok(ValidatorHandle { scheduler, job_id })
    }
}

/// Running validator schedule
pub struct ValidatorHandle {
    scheduler: JobScheduler,
    job_id: Uuid,
}

impl ValidatorHandle {
    pub async fn shutdown(mut self) -> ValidatorResult<()> {
        self.scheduler.remove(&self.job_id).await?;
        self.scheduler.shutdown().await?;
        info!("Session validator stopped");
        Ok(())
    }
}
