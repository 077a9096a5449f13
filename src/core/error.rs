use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why the identity service refused a login or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorReason {
    InvalidCredentials,
    AccountNotEntitled,
    ServiceUnavailable,
    /// A stored access token was rejected on refresh.
    TokenRejected,
}

impl AuthErrorReason {
    /// Text shown to the user. Each reason maps to its own message.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthErrorReason::InvalidCredentials => "Login failed: wrong e-mail or password",
            AuthErrorReason::AccountNotEntitled => "This account does not own the game",
            AuthErrorReason::ServiceUnavailable => {
                "The login service is unreachable, try again later"
            }
            AuthErrorReason::TokenRejected => "Your session expired, please log in again",
        }
    }
}

impl fmt::Display for AuthErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorReason::InvalidCredentials => write!(f, "invalid credentials"),
            AuthErrorReason::AccountNotEntitled => write!(f, "account not entitled"),
            AuthErrorReason::ServiceUnavailable => write!(f, "service unavailable"),
            AuthErrorReason::TokenRejected => write!(f, "token rejected"),
        }
    }
}

/// A download task that ended in `failed`, as surfaced by an incomplete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    pub name: String,
    pub url: String,
    pub dest: PathBuf,
    pub attempts: u32,
    pub reason: String,
}

/// Central error type for the entire launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transfer of {url} failed: {reason}")]
    TransportFailure { url: String, reason: String },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    IntegrityFailure {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{} of {total} downloads failed", failed.len())]
    IncompleteDownload {
        total: usize,
        failed: Vec<FailedTask>,
    },

    #[error("Download cancelled")]
    Cancelled,

    // ── Versions ────────────────────────────────────────
    #[error("Version manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("Malformed manifest document: {0}")]
    ManifestMalformed(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── Sessions ────────────────────────────────────────
    #[error("Authentication failed: {0}")]
    Auth(AuthErrorReason),

    #[error("No logged in session selected")]
    NotAuthenticated,

    #[error("No cached session with profile id {0}")]
    SessionNotFound(String),

    // ── Launch ──────────────────────────────────────────
    #[error("No value bound for launch placeholder ${{{0}}}")]
    MissingSubstitution(String),

    #[error("Game process could not be started: {0}")]
    LaunchFailed(String),

    #[error("A launch of {version} is already running in {data_dir:?}")]
    LaunchInProgress { version: String, data_dir: PathBuf },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Only network-origin failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LauncherError::Http(_)
                | LauncherError::TransportFailure { .. }
                | LauncherError::ManifestUnavailable(_)
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for UI shells ─────────────────────────
// Front-ends forward the display string unchanged.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
