//! Session manager: token lifecycle and authenticated requests.
//!
//! The manager is the only writer of the credential pair and the cached
//! profile. Requests that come back 401 are recovered by one coalesced
//! refresh and exactly one retry; anything beyond that tears the session
//! down.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::refresh::RefreshGate;
use super::tokens::{
    RefreshRequest, TokenRequest, TokenResponse, LOGOUT_PATH, PROFILE_PATH, REFRESH_PATH,
    SIGNUP_PATH, TOKEN_PATH,
};
use crate::api::models::{NewAccount, Profile};
use crate::config::Config;
use crate::error::ApiError;
use crate::notify::Notifier;
use crate::store::{self, CredentialPair, CredentialStore, SecureString};
use crate::transport::{ApiReply, ApiRequest, HttpTransport, Transport, GENERIC_ERROR_MESSAGE};

const LOGIN_FAILED_MESSAGE: &str = "Couldn't log you in. Try again.";
const SIGNUP_FAILED_MESSAGE: &str = "Couldn't sign you up. Try again.";

/// Published whenever the session is established, identified or torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    SignedOut,
    SignedIn { username: Option<String> },
}

#[derive(Default)]
struct SessionState {
    credentials: Option<CredentialPair>,
    profile: Option<Profile>,
    rotated_at: Option<DateTime<Utc>>,
    /// Refresh token the server already refused; it is never sent again.
    failed_refresh: Option<SecureString>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    state: RwLock<SessionState>,
    refresh_gate: Arc<RefreshGate>,
    status: watch::Sender<SessionStatus>,
    notifier: Notifier,
}

/// Handle to the session. Clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a session manager, restoring any persisted credential pair.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        notifier: Notifier,
    ) -> Self {
        let credentials = match store.load() {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to restore saved credentials: {}", e);
                None
            }
        };

        let initial = if credentials.is_some() {
            info!("Restored saved session");
            SessionStatus::SignedIn { username: None }
        } else {
            SessionStatus::SignedOut
        };
        let (status, _) = watch::channel(initial);

        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                state: RwLock::new(SessionState {
                    credentials,
                    ..SessionState::default()
                }),
                refresh_gate: Arc::new(RefreshGate::new()),
                status,
                notifier,
            }),
        }
    }

    /// Build a session manager with the HTTP transport and credential store from `config`.
    pub fn from_config(config: &Config, notifier: Notifier) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        let store = store::open_store(config).context("Failed to open credential store")?;
        Ok(Self::new(Arc::new(transport), store, notifier))
    }

    /// The current access token, if signed in.
    pub fn access_token(&self) -> Option<SecureString> {
        self.inner.access_token()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner.refresh_token().is_some()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.read().credentials.is_some()
    }

    /// The cached profile, if it has been fetched.
    pub fn profile(&self) -> Option<Profile> {
        self.inner.read().profile.clone()
    }

    /// When the token pair was last rotated by a refresh.
    pub fn rotated_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().rotated_at
    }

    /// Observe sign-in / sign-out transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Exchange username and password for a token pair.
    ///
    /// Existing state is left untouched on failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(TOKEN_PATH).json(&TokenRequest { username, password })?;

        let reply = self
            .inner
            .transport
            .send(&request, None)
            .await
            .into_result()
            .map_err(|e| match with_fallback(e, LOGIN_FAILED_MESSAGE) {
                ApiError::Server {
                    status: 401,
                    message,
                } => ApiError::Unauthorized(message),
                other => other,
            })?;

        let pair = reply.decode::<TokenResponse>()?.into_pair();
        self.inner.install(pair);

        info!("Logged in as {}", username);
        Ok(())
    }

    /// Create an account. Does not sign in.
    pub async fn signup(&self, account: &NewAccount) -> Result<Profile, ApiError> {
        let request = ApiRequest::post(SIGNUP_PATH).json(account)?;
        debug!("Creating account {:?}", account);

        let profile = self
            .public_request(request)
            .await
            .map_err(|e| with_fallback(e, SIGNUP_FAILED_MESSAGE))?
            .decode::<Profile>()?;
        info!("Created account {}", profile.username);
        Ok(profile)
    }

    /// Send a request that needs no credentials.
    pub async fn public_request(&self, request: ApiRequest) -> Result<ApiReply, ApiError> {
        self.inner.transport.send(&request, None).await.into_result()
    }

    /// Send a request with the current bearer token, recovering once from a 401.
    pub async fn authenticated_request(&self, request: ApiRequest) -> Result<ApiReply, ApiError> {
        let used = self.inner.access_token();
        if used.is_none() && !self.has_refresh_token() {
            debug!("{:?} {} needs a session but none exists", request.method, request.path);
            return Err(ApiError::NotAuthenticated);
        }

        let response = self
            .inner
            .transport
            .send(&request, used.as_ref().map(SecureString::as_str))
            .await;

        if !response.is_unauthorized() {
            return response.into_result();
        }

        if !self.has_refresh_token() {
            warn!("{} was rejected and there is no refresh token", request.path);
            self.logout().await;
            return Err(ApiError::NotAuthenticated);
        }

        if self.inner.refresh_already_failed() {
            warn!("{} was rejected after the session could not be refreshed", request.path);
            self.inner.clear();
            return Err(ApiError::SessionExpired);
        }

        let fresh = match self.fresh_access_token(used.as_ref()).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Could not refresh the session: {}", e);
                self.logout().await;
                return Err(ApiError::SessionExpired);
            }
        };

        debug!("Retrying {} with refreshed token", request.path);
        let retry = self
            .inner
            .transport
            .send(&request, Some(fresh.as_str()))
            .await;

        if retry.is_unauthorized() {
            warn!("{} was rejected again after refresh", request.path);
            self.logout().await;
            return Err(ApiError::SessionExpired);
        }

        retry.into_result()
    }

    /// Like [`authenticated_request`](Self::authenticated_request), but gives up
    /// with [`ApiError::Cancelled`] once `cancel` completes.
    ///
    /// A refresh already started on behalf of this request keeps running for
    /// the other callers waiting on it.
    pub async fn authenticated_request_until<C>(
        &self,
        request: ApiRequest,
        cancel: C,
    ) -> Result<ApiReply, ApiError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.authenticated_request(request) => result,
            _ = cancel => {
                debug!("Request cancelled by caller");
                Err(ApiError::Cancelled)
            }
        }
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// Concurrent calls share a single network request and its outcome.
    /// Failure is reported but does not sign out.
    pub async fn refresh_access_token(&self) -> Result<SecureString, ApiError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .refresh_gate
            .run(move || async move { inner.perform_refresh().await })
            .await
    }

    /// Refresh unless another task already replaced the token that was rejected.
    async fn fresh_access_token(
        &self,
        rejected: Option<&SecureString>,
    ) -> Result<SecureString, ApiError> {
        if let (Some(current), Some(rejected)) = (self.inner.access_token(), rejected) {
            if current != *rejected && !self.inner.refresh_gate.is_refreshing() {
                debug!("Token already rotated by another request");
                return Ok(current);
            }
        }

        self.refresh_access_token().await
    }

    /// Tell the server the session is over, then forget all credentials.
    ///
    /// Clearing local state always happens, whatever the server says.
    pub async fn logout(&self) {
        if let Some(token) = self.inner.access_token() {
            let request = ApiRequest::post(LOGOUT_PATH);
            let response = self.inner.transport.send(&request, Some(token.as_str())).await;

            if !response.is_success() && !response.is_unauthorized() {
                self.inner.notifier.warn(
                    response
                        .error
                        .unwrap_or_else(|| "Logout failed. Please try again.".to_string()),
                );
            }
        }

        self.inner.clear();
        info!("Logged out");
    }

    /// Fetch and cache the authenticated user's profile.
    ///
    /// Failures are surfaced as a warning notice; only the usual 401 handling
    /// can end the session.
    pub async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        let result = self
            .authenticated_request(ApiRequest::get(PROFILE_PATH))
            .await
            .and_then(ApiReply::decode::<Profile>);

        match result {
            Ok(profile) => {
                self.inner.set_profile(profile.clone());
                Ok(profile)
            }
            Err(e) => {
                let message = match &e {
                    ApiError::Decode(_) => "Couldn't fetch your profile.".to_string(),
                    other => other.user_message(),
                };
                self.inner.notifier.warn(message);
                Err(e)
            }
        }
    }

    /// The cached profile, fetching it once if needed.
    pub async fn ensure_profile(&self) -> Result<Profile, ApiError> {
        match self.profile() {
            Some(profile) => Ok(profile),
            None => self.fetch_profile().await,
        }
    }
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn access_token(&self) -> Option<SecureString> {
        self.read()
            .credentials
            .as_ref()
            .map(|pair| SecureString::from(pair.access()))
    }

    fn refresh_token(&self) -> Option<SecureString> {
        self.read()
            .credentials
            .as_ref()
            .filter(|pair| !pair.refresh().is_empty())
            .map(|pair| SecureString::from(pair.refresh()))
    }

    /// Store and publish a pair from a fresh login.
    fn install(&self, pair: CredentialPair) {
        let mut state = self.write();
        self.persist(&pair);
        state.credentials = Some(pair);
        state.profile = None;
        state.rotated_at = None;
        state.failed_refresh = None;
        drop(state);

        self.status
            .send_replace(SessionStatus::SignedIn { username: None });
    }

    /// Replace the pair after a refresh, unless the session changed meanwhile.
    fn rotate(&self, spent_refresh: &SecureString, pair: CredentialPair) -> Result<(), ApiError> {
        let mut state = self.write();

        let still_current = state
            .credentials
            .as_ref()
            .map(|current| current.refresh() == spent_refresh.as_str())
            .unwrap_or(false);
        if !still_current {
            warn!("Session changed during token refresh, discarding refreshed tokens");
            return Err(ApiError::SessionExpired);
        }

        self.persist(&pair);
        state.credentials = Some(pair);
        state.rotated_at = Some(Utc::now());
        state.failed_refresh = None;
        Ok(())
    }

    fn persist(&self, pair: &CredentialPair) {
        if let Err(e) = self.store.save(pair) {
            error!("Failed to persist credentials: {}", e);
            self.notifier
                .warn("Failed to save credentials securely. You will need to sign in again next time.");
        }
    }

    fn set_profile(&self, profile: Profile) {
        let mut state = self.write();
        if state.credentials.is_none() {
            debug!("Dropping profile fetched for a session that has ended");
            return;
        }
        let username = profile.username.clone();
        state.profile = Some(profile);
        drop(state);

        self.status.send_replace(SessionStatus::SignedIn {
            username: Some(username),
        });
    }

    fn clear(&self) {
        let mut state = self.write();
        if let Err(e) = self.store.clear() {
            error!("Failed to clear stored credentials: {}", e);
        }
        *state = SessionState::default();
        drop(state);

        self.status.send_replace(SessionStatus::SignedOut);
    }

    /// True when the current refresh token is one the server already refused.
    fn refresh_already_failed(&self) -> bool {
        let state = self.read();
        match (&state.credentials, &state.failed_refresh) {
            (Some(current), Some(failed)) => current.refresh() == failed.as_str(),
            _ => false,
        }
    }

    fn mark_refresh_failed(&self, spent_refresh: &SecureString) {
        let mut state = self.write();
        let still_current = state
            .credentials
            .as_ref()
            .map(|current| current.refresh() == spent_refresh.as_str())
            .unwrap_or(false);
        if still_current {
            state.failed_refresh = Some(spent_refresh.clone());
        }
    }

    async fn perform_refresh(&self) -> Result<SecureString, ApiError> {
        let refresh = self.refresh_token().ok_or(ApiError::NotAuthenticated)?;

        let result = self.exchange_refresh(&refresh).await;
        if let Err(e) = &result {
            debug!("Token refresh failed: {}", e);
            self.mark_refresh_failed(&refresh);
        }
        result
    }

    async fn exchange_refresh(&self, refresh: &SecureString) -> Result<SecureString, ApiError> {
        debug!("Refreshing access token");
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh: refresh.as_str(),
        })?;

        let pair = self
            .transport
            .send(&request, None)
            .await
            .into_result()?
            .decode::<TokenResponse>()?
            .into_pair();

        let access = SecureString::from(pair.access());
        self.rotate(refresh, pair)?;

        info!("Access token refreshed");
        Ok(access)
    }
}

/// Replace the transport's generic failure text with an operation-specific one.
fn with_fallback(error: ApiError, fallback: &str) -> ApiError {
    match error {
        ApiError::Server { status, message } if message == GENERIC_ERROR_MESSAGE => {
            ApiError::Server {
                status,
                message: fallback.to_string(),
            }
        }
        other => other,
    }
}
