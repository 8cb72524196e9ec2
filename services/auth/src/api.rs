//! Authentication endpoints of the library backend

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult, RefreshError, is_unavailable};
use crate::http::{ApiRequest, Transport};
use crate::jwt;
use crate::middleware::ApiClient;
use crate::refresh::{TokenPair, TokenRefresher};
use crate::session::{Role, Session, SessionStore};

pub const LOGIN_PATH: &str = "/common/auth/login";
pub const INTROSPECT_PATH: &str = "/common/auth/introspect";
pub const REFRESH_PATH: &str = "/common/auth/refresh";
pub const LOGOUT_PATH: &str = "/common/auth/logout";
pub const FIRST_LOGIN_PASSWORD_PATH: &str = "/user/accounts/change-password-first-login";

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, rename = "firstLogin")]
    pub first_login: bool,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Body shared by the introspect, refresh and logout endpoints
#[derive(Debug, Serialize)]
struct TokenBody<'a> {
    token: &'a str,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IntrospectResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPasswordRequest<'a> {
    new_password: &'a str,
}

/// Result of a successful login call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The session is stored and logged in
    LoggedIn { role: Role },
    /// The account must set a new password before it can log in
    PasswordChangeRequired,
}

/// Login, introspection and logout against the backend
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
    store: SessionStore,
}

impl AuthApi {
    pub fn new(client: ApiClient, store: SessionStore) -> Self {
        AuthApi { client, store }
    }

    /// Authenticate and commit the new session in one write
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<LoginOutcome> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest { email, password })?;
        let response: LoginResponse = self.client.execute_json(request).await?;

        if response.first_login {
            info!("First login for {}, password change required", email);
            self.store
                .set(Session {
                    access_token: Some(response.access_token),
                    first_login: true,
                    ..Session::default()
                })
                .await?;
            return Ok(LoginOutcome::PasswordChangeRequired);
        }

        let refresh_token = response.refresh_token.ok_or_else(|| {
            ClientError::InvalidResponse("login response carries no refresh token".to_string())
        })?;
        let role = match response.scope.filter(|scope| !scope.is_empty()) {
            Some(scope) => Role::from(scope),
            None => jwt::role_from_token(&response.access_token).map_err(|e| {
                ClientError::InvalidResponse(format!("cannot determine role: {}", e))
            })?,
        };

        let session = self
            .store
            .set(Session::authenticated(
                response.access_token,
                refresh_token,
                role,
            ))
            .await?;
        info!("Logged in {} as {}", email, session.role);

        Ok(LoginOutcome::LoggedIn { role: session.role })
    }

    /// Ask the backend whether the stored access token is still valid.
    ///
    /// Sent as an auth-required request, so an expired token goes through
    /// the refresh flow first.
    pub async fn introspect(&self) -> ClientResult<bool> {
        let token = self.store.access_token().unwrap_or_default();
        let request = ApiRequest::post(INTROSPECT_PATH)
            .authorized()
            .json(&TokenBody { token: &token })?;

        let response: IntrospectResponse = self.client.execute_json(request).await?;
        debug!("Introspection result: valid = {}", response.valid);
        Ok(response.valid)
    }

    /// Notify the backend and clear the local session.
    ///
    /// The local session is cleared even when the backend call fails.
    pub async fn logout(&self) -> ClientResult<()> {
        if let Some(token) = self.store.access_token() {
            let request = ApiRequest::post(LOGOUT_PATH).json(&TokenBody { token: &token })?;
            if let Err(e) = self.client.execute(request).await {
                warn!("Logout call failed, clearing session anyway: {}", e);
            }
        }

        self.store.clear().await?;
        Ok(())
    }

    /// Set the password of a first-login account; the user logs in again afterwards
    pub async fn change_password_first_login(&self, new_password: &str) -> ClientResult<()> {
        let request = ApiRequest::post(FIRST_LOGIN_PASSWORD_PATH)
            .authorized()
            .json(&NewPasswordRequest { new_password })?;
        self.client.execute(request).await?;

        info!("Initial password changed");
        self.store.clear().await?;
        Ok(())
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

/// [`TokenRefresher`] calling the refresh endpoint on the bare transport
///
/// The exchange bypasses the middleware chain so it can never trigger a
/// nested refresh.
#[derive(Clone)]
pub struct HttpTokenRefresher {
    transport: Arc<dyn Transport>,
}

impl HttpTokenRefresher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        HttpTokenRefresher { transport }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&TokenBody {
                token: refresh_token,
            })
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => return Err(RefreshError::Unavailable(e.to_string())),
        };

        if is_unavailable(response.status) {
            return Err(RefreshError::Unavailable(format!(
                "refresh endpoint answered {}",
                response.status
            )));
        }
        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status.as_u16(),
            });
        }

        response
            .json::<TokenPair>()
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ApiResponse;
    use reqwest::StatusCode;
    use serde_json::json;

    /// Answers every request with a fixed response
    struct FixedTransport(ClientResult<ApiResponse>);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(&self, _request: &ApiRequest) -> ClientResult<ApiResponse> {
            match &self.0 {
                Ok(response) => Ok(response.clone()),
                Err(e) => Err(ClientError::Transport(e.to_string())),
            }
        }
    }

    fn refresher(result: ClientResult<ApiResponse>) -> HttpTokenRefresher {
        HttpTokenRefresher::new(Arc::new(FixedTransport(result)))
    }

    #[tokio::test]
    async fn test_refresher_decodes_token_pair() {
        let refresher = refresher(Ok(ApiResponse::new(
            StatusCode::OK,
            json!({"access_token": "B", "refresh_token": "R2"}),
        )));
        assert_eq!(
            refresher.refresh("R").await,
            Ok(TokenPair {
                access_token: "B".into(),
                refresh_token: "R2".into()
            })
        );
    }

    #[tokio::test]
    async fn test_refresher_classifies_failures() {
        let unavailable = refresher(Ok(ApiResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            json!(null),
        )));
        assert!(matches!(
            unavailable.refresh("R").await,
            Err(RefreshError::Unavailable(_))
        ));

        let unreachable = refresher(Err(ClientError::Transport("connection refused".into())));
        assert!(matches!(
            unreachable.refresh("R").await,
            Err(RefreshError::Unavailable(_))
        ));

        let rejected = refresher(Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, json!(null))));
        assert_eq!(
            rejected.refresh("R").await,
            Err(RefreshError::Rejected { status: 401 })
        );

        let garbage = refresher(Ok(ApiResponse::new(StatusCode::OK, json!({"oops": 1}))));
        assert!(matches!(
            garbage.refresh("R").await,
            Err(RefreshError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_login_response_defaults() {
        let response: LoginResponse =
            serde_json::from_value(json!({"access_token": "A", "firstLogin": true})).unwrap();
        assert!(response.first_login);
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.scope, None);
    }
}
