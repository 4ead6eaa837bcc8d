//! Secure data wrappers that are zeroized on drop.
//!
//! These types ensure sensitive data like tokens are cleared from memory
//! when they're no longer needed.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secure string wrapper that zeroizes its contents on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// The access/refresh token pair of a logged-in session.
///
/// Both tokens always travel together: the pair is stored, replaced and
/// cleared as a single value.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CredentialPair {
    access: SecureString,
    refresh: SecureString,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: SecureString::new(access.into()),
            refresh: SecureString::new(refresh.into()),
        }
    }

    pub fn access(&self) -> &str {
        self.access.as_str()
    }

    pub fn refresh(&self) -> &str {
        self.refresh.as_str()
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &self.access)
            .field("refresh", &self.refresh)
            .finish()
    }
}

/// On-disk shape of a credential record.
///
/// Fields are optional so a half-written or hand-edited record can be
/// detected and discarded instead of failing to parse.
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl StoredCredentials {
    pub fn from_pair(pair: &CredentialPair) -> Self {
        Self {
            access: Some(pair.access().to_string()),
            refresh: Some(pair.refresh().to_string()),
        }
    }

    /// Both tokens, or nothing.
    pub fn into_pair(mut self) -> Option<CredentialPair> {
        match (self.access.take(), self.refresh.take()) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(CredentialPair::new(access, refresh))
            }
            (mut access, mut refresh) => {
                access.zeroize();
                refresh.zeroize();
                None
            }
        }
    }
}

impl Drop for StoredCredentials {
    fn drop(&mut self) {
        self.access.zeroize();
        self.refresh.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_debug() {
        let secret = SecureString::new("super_secret_token".to_string());
        let debug_output = format!("{:?}", secret);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("super_secret"));
    }

    #[test]
    fn test_credential_pair_debug_is_redacted() {
        let pair = CredentialPair::new("T1", "R1");
        let debug_output = format!("{:?}", pair);
        assert!(!debug_output.contains("T1"));
        assert!(!debug_output.contains("R1"));
        assert_eq!(pair.access(), "T1");
        assert_eq!(pair.refresh(), "R1");
    }

    #[test]
    fn test_half_record_is_discarded() {
        let stored: StoredCredentials = serde_json::from_str(r#"{"access":"T1"}"#).unwrap();
        assert!(stored.into_pair().is_none());

        let stored: StoredCredentials =
            serde_json::from_str(r#"{"access":"T1","refresh":""}"#).unwrap();
        assert!(stored.into_pair().is_none());

        let stored: StoredCredentials =
            serde_json::from_str(r#"{"access":"T1","refresh":"R1"}"#).unwrap();
        assert_eq!(stored.into_pair(), Some(CredentialPair::new("T1", "R1")));
    }
}
