//! mailconsole - client for the mail and organization console API.
//!
//! The [`auth::SessionManager`] owns the credential pair and is the only way
//! requests reach the backend; [`api`] builds typed clients on top of it.

#![deny(clippy::all)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod notify;
pub mod settings;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::{SessionManager, SessionStatus};
pub use config::Config;
pub use error::{ApiError, AppError, StoreError};
