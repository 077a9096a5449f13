// ─── Identity Service ───
// The remote account service is a black box behind `IdentityService`.
// `YggdrasilClient` speaks the JSON-over-HTTP protocol of the classic
// Mojang auth server.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{AuthErrorReason, LauncherError, LauncherResult};

use super::session::Session;

pub const DEFAULT_AUTH_SERVER: &str = "https://authserver.mojang.com";

/// Tokens and identity returned by a successful login or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub access_token: String,
    pub client_token: String,
    pub profile_id: String,
    pub username: String,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("profile_id", &self.profile_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Failures are `LauncherError::Auth` with the reason the service gave.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        client_token: &str,
    ) -> LauncherResult<AuthResponse>;

    /// Exchange a stored token for a fresh one.
    async fn refresh(&self, session: &Session) -> LauncherResult<AuthResponse>;

    async fn validate(&self, session: &Session) -> LauncherResult<bool>;

    async fn invalidate(&self, session: &Session) -> LauncherResult<()>;
}

pub struct YggdrasilClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct Agent {
    name: &'static str,
    version: u32,
}

const AGENT: Agent = Agent {
    name: "Minecraft",
    version: 1,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateRequest<'a> {
    agent: Agent,
    username: &'a str,
    password: &'a str,
    client_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    access_token: &'a str,
    client_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    client_token: String,
    #[serde(default)]
    selected_profile: Option<GameProfile>,
}

#[derive(Deserialize)]
struct GameProfile {
    id: String,
    name: String,
}

impl YggdrasilClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_AUTH_SERVER)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> LauncherResult<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("POST {}", url);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("Identity service unreachable at {}: {}", url, e);
                LauncherError::Auth(AuthErrorReason::ServiceUnavailable)
            })
    }

    /// Decode a token response, or classify the failure. `rejected` is the
    /// reason reported for 401/403.
    async fn token_response(
        response: reqwest::Response,
        rejected: AuthErrorReason,
    ) -> LauncherResult<AuthResponse> {
        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            return Err(LauncherError::Auth(rejected));
        }
        if !status.is_success() {
            warn!("Identity service answered HTTP {}", status.as_u16());
            return Err(LauncherError::Auth(AuthErrorReason::ServiceUnavailable));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            warn!("Unreadable identity service response: {}", e);
            LauncherError::Auth(AuthErrorReason::ServiceUnavailable)
        })?;
        let profile = body
            .selected_profile
            .ok_or(LauncherError::Auth(AuthErrorReason::AccountNotEntitled))?;

        Ok(AuthResponse {
            access_token: body.access_token,
            client_token: body.client_token,
            profile_id: profile.id,
            username: profile.name,
        })
    }
}

#[async_trait]
impl IdentityService for YggdrasilClient {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        client_token: &str,
    ) -> LauncherResult<AuthResponse> {
        let request = AuthenticateRequest {
            agent: AGENT,
            username,
            password,
            client_token,
        };
        let response = self.post("authenticate", &request).await?;
        Self::token_response(response, AuthErrorReason::InvalidCredentials).await
    }

    async fn refresh(&self, session: &Session) -> LauncherResult<AuthResponse> {
        let request = TokenRequest {
            access_token: &session.access_token,
            client_token: &session.client_token,
        };
        let response = self.post("refresh", &request).await?;
        Self::token_response(response, AuthErrorReason::TokenRejected).await
    }

    async fn validate(&self, session: &Session) -> LauncherResult<bool> {
        let request = TokenRequest {
            access_token: &session.access_token,
            client_token: &session.client_token,
        };
        let status = self.post("validate", &request).await?.status();
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            Ok(false)
        } else {
            Err(LauncherError::Auth(AuthErrorReason::ServiceUnavailable))
        }
    }

    async fn invalidate(&self, session: &Session) -> LauncherResult<()> {
        let request = TokenRequest {
            access_token: &session.access_token,
            client_token: &session.client_token,
        };
        let status = self.post("invalidate", &request).await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(LauncherError::Auth(AuthErrorReason::ServiceUnavailable))
        }
    }
}
