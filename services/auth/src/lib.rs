//! Authenticated client core for the library-loan backend
//!
//! - [`session`]: the persisted session and its store
//! - [`http`] and [`middleware`]: request descriptors, transport, and the
//!   explicit `(request, next)` middleware chain
//! - [`refresh`]: single-flight access token refresh
//! - [`api`]: login, introspection, logout
//! - [`validator`]: periodic session validation
//! - [`guard`]: route access decisions

pub mod api;
pub mod client;
pub mod error;
pub mod guard;
pub mod http;
pub mod jwt;
pub mod middleware;
pub mod refresh;
pub mod session;
pub mod validator;

pub use api::{AuthApi, LoginOutcome};
pub use client::AuthClient;
pub use error::{ClientError, ClientResult, ErrorKind, RefreshError};
pub use guard::{GuardDecision, RoutePolicy};
pub use http::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
pub use middleware::{ApiClient, Middleware, Next};
pub use refresh::{RefreshCoordinator, TokenPair};
pub use session::{Role, Session, SessionStore};
pub use validator::{SessionValidator, ValidationOutcome};
