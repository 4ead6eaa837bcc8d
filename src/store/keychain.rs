//! macOS Keychain integration for secure token storage.
//!
//! The pair is kept as one generic-password item holding the same JSON
//! record the file store writes.

use security_framework::passwords::{
    delete_generic_password, get_generic_password, set_generic_password,
};
use zeroize::Zeroizing;

use super::secure::{CredentialPair, StoredCredentials};
use super::CredentialStore;
use crate::error::StoreError;

/// Keychain service identifier.
const SERVICE: &str = "dev.mailconsole.session";

/// Account name for the credential record.
const ACCOUNT_CREDENTIALS: &str = "session_credentials";

/// Credential store backed by the login Keychain.
#[derive(Debug, Default)]
pub struct KeychainStore;

impl KeychainStore {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialStore for KeychainStore {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        let bytes = match get_generic_password(SERVICE, ACCOUNT_CREDENTIALS) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if is_not_found_error(&e) => return Ok(None),
            Err(e) => return Err(StoreError::Read(e.to_string())),
        };

        let stored: StoredCredentials =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(stored.into_pair())
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let json = Zeroizing::new(
            serde_json::to_string(&StoredCredentials::from_pair(pair))
                .map_err(|e| StoreError::Write(e.to_string()))?,
        );

        set_generic_password(SERVICE, ACCOUNT_CREDENTIALS, json.as_bytes())
            .map_err(|e| StoreError::Write(e.to_string()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        match delete_generic_password(SERVICE, ACCOUNT_CREDENTIALS) {
            Ok(()) => Ok(()),
            Err(e) if is_not_found_error(&e) => Ok(()),
            Err(e) => Err(StoreError::Delete(e.to_string())),
        }
    }
}

/// Helper to check if a security framework error is "item not found".
fn is_not_found_error(error: &security_framework::base::Error) -> bool {
    // errSecItemNotFound = -25300
    error.code() == -25300
}
