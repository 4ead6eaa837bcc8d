//! Token endpoint paths and bodies.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::store::CredentialPair;

/// Issue a token pair for username/password.
pub const TOKEN_PATH: &str = "/user/token/";
/// Exchange a refresh token for a new pair.
pub const REFRESH_PATH: &str = "/user/token/refresh/";
/// Create an account.
pub const SIGNUP_PATH: &str = "/user/create/";
/// The authenticated user's own profile.
pub const PROFILE_PATH: &str = "/user/manage/";
/// Invalidate the session server-side.
pub const LOGOUT_PATH: &str = "/user/logout/";

#[derive(Serialize)]
pub struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// `{access, refresh}` as returned by both token endpoints.
#[derive(Deserialize)]
pub struct TokenResponse {
    access: String,
    refresh: String,
}

impl TokenResponse {
    pub fn into_pair(mut self) -> CredentialPair {
        CredentialPair::new(
            std::mem::take(&mut self.access),
            std::mem::take(&mut self.refresh),
        )
    }
}

impl Drop for TokenResponse {
    fn drop(&mut self) {
        self.access.zeroize();
        self.refresh.zeroize();
    }
}
