// ─── Session Manager ───
// Owns the login state machine and the cached session set.
//
//   LoggedOut ──login──▶ Authenticating ──ok──▶ LoggedIn
//       ▲                      │ err                │ refresh rejected
//       └──────────────────────┘                    ▼
//       ◀──────────────── logout ─────────── Invalidated

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::error::{AuthErrorReason, LauncherError, LauncherResult};

use super::identity::{AuthResponse, IdentityService};
use super::profiles::SessionSet;
use super::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    Authenticating,
    LoggedIn,
    Invalidated,
}

pub struct SessionManager {
    identity: Arc<dyn IdentityService>,
    profiles_path: PathBuf,
    sessions: SessionSet,
    state: AuthState,
}

impl SessionManager {
    /// Manager over the session file at `profiles_path`. Cached sessions are
    /// available for selection but nobody is logged in until a login or
    /// refresh succeeds.
    pub async fn load(
        identity: Arc<dyn IdentityService>,
        profiles_path: impl Into<PathBuf>,
    ) -> LauncherResult<Self> {
        let profiles_path = profiles_path.into();
        let sessions = SessionSet::load(&profiles_path).await?.unwrap_or_default();
        Ok(Self {
            identity,
            profiles_path,
            sessions,
            state: AuthState::LoggedOut,
        })
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn sessions(&self) -> &SessionSet {
        &self.sessions
    }

    pub fn selected(&self) -> Option<&Session> {
        self.sessions.selected_session()
    }

    pub fn apply_profile_override(&mut self, profile_id: &str) {
        self.sessions.apply_profile_override(profile_id);
    }

    pub async fn login(&mut self, username: &str, password: &str) -> LauncherResult<Session> {
        if username.trim().is_empty() || password.is_empty() {
            self.state = AuthState::LoggedOut;
            return Err(LauncherError::Auth(AuthErrorReason::InvalidCredentials));
        }

        self.state = AuthState::Authenticating;
        info!("Logging in {}", username);

        // Keep the client token stable per account so the service can tie
        // sessions together.
        let client_token = self
            .sessions
            .available()
            .iter()
            .find(|s| s.email == username && !s.client_token.is_empty())
            .map(|s| s.client_token.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let response = match self
            .identity
            .authenticate(username, password, &client_token)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Login of {} failed: {}", username, e);
                self.state = AuthState::LoggedOut;
                return Err(e);
            }
        };

        let mut session = session_from(response, username);
        session.mark_logged_in();
        let profile_id = session.profile_id.clone();
        self.sessions.add_available(session.clone());
        self.sessions.set_selected(&profile_id)?;
        self.state = AuthState::LoggedIn;
        info!("Logged in as {} ({})", session.username, profile_id);

        self.persist().await?;
        Ok(session)
    }

    /// Silently renew the selected session's token.
    pub async fn refresh(&mut self) -> LauncherResult<Session> {
        let current = match self.sessions.selected_session() {
            Some(s) if s.has_access_token() => s.clone(),
            _ => return Err(LauncherError::NotAuthenticated),
        };

        self.state = AuthState::Authenticating;
        match self.identity.refresh(&current).await {
            Ok(response) => {
                let mut session = session_from(response, &current.email);
                session.mark_logged_in();
                // The profile stays the same; only the tokens move.
                session.profile_id = current.profile_id.clone();
                self.sessions.add_available(session.clone());
                self.state = AuthState::LoggedIn;
                info!("Refreshed session of {}", session.username);
                self.persist().await?;
                Ok(session)
            }
            Err(LauncherError::Auth(
                AuthErrorReason::TokenRejected | AuthErrorReason::InvalidCredentials,
            )) => {
                warn!("Token of {} was rejected", current.username);
                if let Some(s) = self.sessions.selected_session_mut() {
                    s.mark_invalid();
                }
                self.state = AuthState::Invalidated;
                self.persist().await?;
                Err(LauncherError::Auth(AuthErrorReason::TokenRejected))
            }
            Err(e) => {
                warn!("Refresh of {} failed: {}", current.username, e);
                self.state = AuthState::LoggedOut;
                Err(e)
            }
        }
    }

    /// Drop the selected session. Remote invalidation is best-effort.
    pub async fn logout(&mut self) -> LauncherResult<()> {
        if let Some(session) = self.sessions.selected_session().cloned() {
            info!("Logging out {}", session.username);
            if session.has_access_token() {
                if let Err(e) = self.identity.invalidate(&session).await {
                    warn!("Remote invalidation for {} failed: {}", session.username, e);
                }
            }
            self.sessions.remove_available(&session.profile_id);
        }
        self.sessions.clear_selected();
        self.state = AuthState::LoggedOut;
        self.persist().await
    }

    /// Switch to another cached session. Local only.
    pub async fn select_session(&mut self, profile_id: &str) -> LauncherResult<()> {
        self.sessions.set_selected(profile_id)?;
        self.state = match self.sessions.selected_session() {
            Some(s) if s.is_logged_in() => AuthState::LoggedIn,
            _ => AuthState::LoggedOut,
        };
        self.persist().await
    }

    /// The selected session, logged in. A cached token is refreshed first;
    /// anything else is `NotAuthenticated`.
    pub async fn ensure_logged_in(&mut self) -> LauncherResult<Session> {
        if self.state == AuthState::Invalidated {
            return Err(LauncherError::NotAuthenticated);
        }
        match self.sessions.selected_session() {
            Some(s) if s.is_logged_in() && self.state == AuthState::LoggedIn => Ok(s.clone()),
            Some(s) if s.has_access_token() => self.refresh().await,
            _ => Err(LauncherError::NotAuthenticated),
        }
    }

    async fn persist(&self) -> LauncherResult<()> {
        self.sessions.save(&self.profiles_path).await
    }
}

fn session_from(response: AuthResponse, email: &str) -> Session {
    Session::new(
        response.username,
        email,
        response.access_token,
        response.client_token,
        response.profile_id,
    )
}
