use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

pub const DEFAULT_SERVER_PORT: u16 = 25565;
pub const DEFAULT_MAX_MEMORY_MB: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// A multiplayer server to join on start, `host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        let raw = raw.trim();
        let (host, port) = match raw.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    LauncherError::Other(format!("Invalid server port in {:?}", raw))
                })?;
                (host, port)
            }
            None => (raw, DEFAULT_SERVER_PORT),
        };
        if host.is_empty() {
            return Err(LauncherError::Other(format!(
                "Invalid server address {:?}",
                raw
            )));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// User preferences, persisted as `launcher_settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Explicit runtime executable. Falls back to `JAVA_HOME`, then `PATH`.
    pub java_path: Option<PathBuf>,
    pub max_memory_mb: u32,
    /// Parallel transfers; `None` means available parallelism, capped.
    pub download_concurrency: Option<usize>,
    pub resolution: Option<Resolution>,
    pub fullscreen: bool,
    /// `host[:port]`
    pub server: Option<String>,
    pub launcher_name: String,
    pub launcher_version: String,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            java_path: None,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            download_concurrency: None,
            resolution: None,
            fullscreen: false,
            server: None,
            launcher_name: "craften-launcher".into(),
            launcher_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl LauncherSettings {
    /// Read settings from `path`. A missing or unreadable file yields the
    /// defaults.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {:?}, using defaults", path);
                return Self::default();
            }
            Err(e) => {
                warn!("Could not read settings {:?}: {}", path, e);
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Corrupt settings {:?}, using defaults: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp = part_path(path);
        std::fs::write(&temp, json).map_err(|e| LauncherError::io(path, e))?;
        std::fs::rename(&temp, path).map_err(|e| LauncherError::io(path, e))
    }

    /// The configured server, if it parses.
    pub fn server_address(&self) -> Option<ServerAddress> {
        let raw = self.server.as_deref()?;
        match ServerAddress::parse(raw) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!("Ignoring server setting: {}", e);
                None
            }
        }
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".part");
    PathBuf::from(temp)
}
