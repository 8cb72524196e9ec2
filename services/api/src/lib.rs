//! Library-loan client
//!
//! Typed access to the library REST API on top of the authenticated
//! pipeline from the `auth` crate, plus the application's route table.

pub mod error;
pub mod library;
pub mod models;
pub mod routes;
pub mod state;

pub use error::{AppError, AppResult};
pub use library::LibraryApi;
pub use routes::{Navigation, Screen};
pub use state::AppState;
