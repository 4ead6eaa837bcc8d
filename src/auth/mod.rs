//! Session authentication.
//!
//! Provides username/password login against the token endpoints, transparent
//! access-token refresh with coalescing, and logout.

pub mod refresh;
pub mod session;
pub mod tokens;

pub use refresh::RefreshGate;
pub use session::{SessionManager, SessionStatus};
