use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a cached session stands with the identity service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No token yet.
    #[default]
    Fresh,
    /// Holds a token that has not been confirmed in this run.
    HasToken,
    LoggedIn,
    /// The service rejected the token.
    Invalid,
}

/// One account usable for launching.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub client_token: String,
    pub profile_id: String,
    /// Runtime only. Loaded sessions start from what their token allows.
    #[serde(skip)]
    pub state: SessionState,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        access_token: impl Into<String>,
        client_token: impl Into<String>,
        profile_id: impl Into<String>,
    ) -> Self {
        let mut session = Self {
            username: username.into(),
            email: email.into(),
            access_token: access_token.into(),
            client_token: client_token.into(),
            profile_id: profile_id.into(),
            state: SessionState::Fresh,
        };
        session.reset_state();
        session
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == SessionState::LoggedIn
    }

    /// State implied by the stored token alone.
    pub fn reset_state(&mut self) {
        self.state = if self.has_access_token() {
            SessionState::HasToken
        } else {
            SessionState::Fresh
        };
    }

    pub fn mark_logged_in(&mut self) {
        self.state = SessionState::LoggedIn;
    }

    /// The rejected token is dropped so a reload cannot revive it.
    pub fn mark_invalid(&mut self) {
        self.access_token.clear();
        self.state = SessionState::Invalid;
    }
}

// Equality covers the persisted fields only.
impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.email == other.email
            && self.access_token == other.access_token
            && self.client_token == other.client_token
            && self.profile_id == other.profile_id
    }
}

impl Eq for Session {}

// Tokens never reach logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .field("client_token", &"<redacted>")
            .field("profile_id", &self.profile_id)
            .field("state", &self.state)
            .finish()
    }
}
