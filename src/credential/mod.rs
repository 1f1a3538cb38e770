//! Credential store: the settlement provider's bearer token.
//!
//! The token lives in a single configuration row whose value is a JSON
//! document `{"accessToken": "...", "expiresAt": ...}`. An external refresher
//! keeps it current; this crate only reads it.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;

/// Configuration key of the provider token row.
pub const DEFAULT_CREDENTIAL_KEY: &str = "settlement_provider_access_token";

/// Bearer token for the settlement provider.
///
/// The token text is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Creates a token with an optional expiry.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Parses a stored credential value.
    ///
    /// A malformed document or a missing `accessToken` field yields an empty
    /// token rather than an error. `expiresAt` may be epoch seconds or an
    /// RFC 3339 string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Self::new(String::new(), None);
        };
        let token = value
            .get("accessToken")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let expires_at = value.get("expiresAt").and_then(|v| {
            v.as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .or_else(|| {
                    v.as_str()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                })
        });
        Self::new(token, expires_at)
    }

    /// Interprets the optional configuration row stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConfigured`] when the row is absent.
    pub fn from_row(key: &str, value: Option<String>) -> Result<Self, AppError> {
        value
            .map(|raw| Self::parse(&raw))
            .ok_or_else(|| AppError::NotConfigured(format!("no configuration row {key:?}")))
    }

    /// Raw token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Expiry, when the refresher recorded one.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns `true` if the token text is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.trim().is_empty()
    }

    /// Returns `true` if the token has a known expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Returns the token, failing explicitly when it is blank.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConfigured`] for a blank token so callers
    /// never send an unauthenticated provider request.
    pub fn require(&self) -> Result<&str, AppError> {
        if self.is_empty() {
            return Err(AppError::NotConfigured(
                "credential row carries no access token".to_string(),
            ));
        }
        Ok(&self.token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &if self.is_empty() { "<empty>" } else { "<redacted>" })
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Read access to the provider credential.
///
/// Implementations must allow concurrent readers.
#[async_trait]
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Loads the current token.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConfigured`] when the credential row is absent
    /// and [`AppError::Persistence`] when storage fails.
    async fn access_token(&self) -> Result<AccessToken, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_and_epoch_expiry() {
        let token = AccessToken::parse(r#"{"accessToken":"abc","expiresAt":1700000000}"#);
        assert_eq!(token.as_str(), "abc");
        assert_eq!(
            token.expires_at(),
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn parses_rfc3339_expiry() {
        let token =
            AccessToken::parse(r#"{"accessToken":"abc","expiresAt":"2030-01-01T00:00:00Z"}"#);
        assert!(token.expires_at().is_some());
        assert!(!token.is_expired_at(Utc::now()));
    }

    #[test]
    fn malformed_value_yields_empty_token() {
        assert!(AccessToken::parse("not json").is_empty());
        assert!(AccessToken::parse(r#"{"token":"abc"}"#).is_empty());
        assert!(AccessToken::parse(r#"{"accessToken":42}"#).is_empty());
    }

    #[test]
    fn absent_row_is_not_configured() {
        let result = AccessToken::from_row(DEFAULT_CREDENTIAL_KEY, None);
        assert!(matches!(result, Err(AppError::NotConfigured(_))));
        let present = AccessToken::from_row(DEFAULT_CREDENTIAL_KEY, Some("garbage".into()));
        assert!(matches!(present, Ok(token) if token.is_empty()));
    }

    #[test]
    fn require_rejects_empty_token() {
        let empty = AccessToken::parse("{}");
        assert!(matches!(empty.require(), Err(AppError::NotConfigured(_))));
        let token = AccessToken::new("abc", None);
        assert!(matches!(token.require(), Ok("abc")));
    }

    #[test]
    fn expiry_in_the_past_is_expired() {
        let token = AccessToken::new("abc", DateTime::from_timestamp(1, 0));
        assert!(token.is_expired_at(Utc::now()));
    }

    #[test]
    fn debug_output_redacts_token() {
        let token = AccessToken::new("super-secret", None);
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
