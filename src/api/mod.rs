//! Typed clients for the mail and organization console endpoints.
//!
//! Both clients sit on top of [`SessionManager`](crate::auth::SessionManager)
//! and never talk to the transport directly.

pub mod cache;
pub mod console;
pub mod format;
pub mod mail;
pub mod models;

pub use cache::{Folder, MailboxCache};
pub use console::ConsoleClient;
pub use mail::{DraftSaved, MailClient, StarTarget};

use crate::error::ApiError;
use crate::transport::ApiReply;

/// Accept `reply` only if the server answered with `expected`.
///
/// Some endpoints signal success with one specific 2xx code; any other
/// success status is reported with `fallback`.
pub(crate) fn expect_status(
    reply: ApiReply,
    expected: u16,
    fallback: &str,
) -> Result<ApiReply, ApiError> {
    if reply.status == expected {
        Ok(reply)
    } else {
        Err(ApiError::Server {
            status: reply.status,
            message: fallback.to_string(),
        })
    }
}
