// ─── Authentication ───
// Session model, durable token store, and the Microsoft OAuth chain.

pub mod microsoft;
pub mod token_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};

pub use microsoft::{AuthEndpoints, BrowserEvent, ConsentBrowser, MicrosoftAuthenticator};
pub use token_store::TokenStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Microsoft,
    Offline,
}

/// One logged-in identity, persisted by the [`TokenStore`].
///
/// Microsoft sessions always carry an access token and a player UUID; offline
/// sessions never carry a refresh token and never expire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub kind: AccountKind,
    pub username: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Stable random UUID, generated once and persisted. Older stored
    /// sessions may lack it; the launch orchestrator backfills it.
    #[serde(default)]
    pub client_token: String,
    /// Epoch milliseconds; `None` means the session never expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl AuthSession {
    pub fn offline(username: &str) -> Self {
        Self {
            kind: AccountKind::Offline,
            username: username.trim().to_string(),
            uuid: None,
            access_token: None,
            refresh_token: None,
            client_token: Uuid::new_v4().to_string(),
            expires_at: None,
        }
    }

    /// Check the data-model invariants before the session is persisted or
    /// turned into launch authorization.
    pub fn validate(&self) -> LauncherResult<()> {
        match self.kind {
            AccountKind::Microsoft => {
                if self.access_token.as_deref().unwrap_or("").is_empty() {
                    return Err(LauncherError::InvalidSession(
                        "Microsoft session without access token".into(),
                    ));
                }
                if self.uuid.as_deref().unwrap_or("").is_empty() {
                    return Err(LauncherError::InvalidSession(
                        "Microsoft session without player UUID".into(),
                    ));
                }
            }
            AccountKind::Offline => {
                if self.refresh_token.is_some() {
                    return Err(LauncherError::InvalidSession(
                        "offline session must not carry a refresh token".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether the access token expires within `window_ms` of now.
    /// Sessions without an expiry never report as expiring.
    pub fn expires_within_ms(&self, window_ms: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now().timestamp_millis() > expires_at - window_ms,
            None => false,
        }
    }

    /// Return the client token, generating and storing one on first use.
    pub fn ensure_client_token(&mut self) -> bool {
        if self.client_token.trim().is_empty() {
            self.client_token = Uuid::new_v4().to_string();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_session_has_no_credentials_and_never_expires() {
        let session = AuthSession::offline("  Steve  ");
        assert_eq!(session.username, "Steve");
        assert_eq!(session.kind, AccountKind::Offline);
        assert!(session.access_token.is_none());
        assert!(session.refresh_token.is_none());
        assert!(session.expires_at.is_none());
        assert!(!session.expires_within_ms(5 * 60 * 1000));
        session.validate().unwrap();
    }

    #[test]
    fn microsoft_session_requires_token_and_uuid() {
        let mut session = AuthSession {
            kind: AccountKind::Microsoft,
            username: "Alex".into(),
            uuid: Some("abc".into()),
            access_token: None,
            refresh_token: Some("refresh".into()),
            client_token: Uuid::new_v4().to_string(),
            expires_at: Some(0),
        };
        assert!(session.validate().is_err());

        session.access_token = Some("token".into());
        session.validate().unwrap();

        session.uuid = None;
        assert!(session.validate().is_err());
    }

    #[test]
    fn expiry_window_matches_refresh_threshold() {
        let now = Utc::now().timestamp_millis();
        let four_minutes = AuthSession {
            expires_at: Some(now + 4 * 60 * 1000),
            ..AuthSession::offline("x")
        };
        let ten_minutes = AuthSession {
            expires_at: Some(now + 10 * 60 * 1000),
            ..AuthSession::offline("x")
        };

        assert!(four_minutes.expires_within_ms(5 * 60 * 1000));
        assert!(!ten_minutes.expires_within_ms(5 * 60 * 1000));
    }

    #[test]
    fn client_token_is_backfilled_once() {
        let mut session = AuthSession::offline("Steve");
        session.client_token = String::new();

        assert!(session.ensure_client_token());
        let generated = session.client_token.clone();
        assert!(!generated.is_empty());
        assert!(!session.ensure_client_token());
        assert_eq!(session.client_token, generated);
    }
}
