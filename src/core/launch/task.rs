// ─── Launch Task ───
// Hands a launch plan to the OS. The child is detached: nothing here waits
// on it after the start-up check.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::{OsName, Platform};

use super::classpath::path_arg;
use super::plan::LaunchPlan;

/// How long a fresh process is watched for an immediate crash.
const STARTUP_GRACE: Duration = Duration::from_millis(300);

/// A fully specified process start.
#[derive(Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(OsString, OsString)>,
    /// Printed as `<redacted>` wherever the request is logged.
    pub secret: Option<String>,
}

impl SpawnRequest {
    pub fn from_plan(plan: &LaunchPlan, java: &Path, platform: &Platform, secret: &str) -> Self {
        Self {
            program: java.to_path_buf(),
            args: plan.command_line(),
            working_dir: plan.working_dir.clone(),
            env: vec![native_library_env(platform, &plan.natives_dir)],
            secret: (!secret.is_empty()).then(|| secret.to_string()),
        }
    }

    /// Shell-like rendering with the secret masked.
    pub fn display_for_logs(&self) -> String {
        let mut parts = vec![shell_escape(&self.program.to_string_lossy())];
        for arg in &self.args {
            let shown = match &self.secret {
                Some(secret) if arg.contains(secret.as_str()) => {
                    arg.replace(secret.as_str(), "<redacted>")
                }
                _ => arg.clone(),
            };
            parts.push(shell_escape(&shown));
        }
        parts.join(" ")
    }
}

impl std::fmt::Debug for SpawnRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnRequest")
            .field("command", &self.display_for_logs())
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

/// A started game process, no longer owned by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedProcess {
    pub pid: Option<u32>,
}

#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    async fn spawn(&self, request: &SpawnRequest) -> LauncherResult<SpawnedProcess>;
}

/// Spawns with `tokio::process`, stdio detached.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    grace: Duration,
}

impl Default for CommandSpawner {
    fn default() -> Self {
        Self {
            grace: STARTUP_GRACE,
        }
    }
}

impl CommandSpawner {
    pub fn with_grace(grace: Duration) -> Self {
        Self { grace }
    }
}

#[async_trait]
impl ProcessSpawner for CommandSpawner {
    async fn spawn(&self, request: &SpawnRequest) -> LauncherResult<SpawnedProcess> {
        let mut cmd = tokio::process::Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        configure_platform_spawn(&mut cmd);

        info!("Launching with {:?}", request.program);
        debug!("Command: {}", request.display_for_logs());

        let mut child = cmd.spawn().map_err(|e| {
            LauncherError::LaunchFailed(format!("{}: {}", request.program.display(), e))
        })?;
        let pid = child.id();

        tokio::time::sleep(self.grace).await;
        match child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                return Err(LauncherError::LaunchFailed(format!(
                    "process exited immediately with {}",
                    status
                )));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(LauncherError::LaunchFailed(format!(
                    "could not query process state: {}",
                    e
                )));
            }
        }

        info!("Game process started (pid {:?})", pid);
        Ok(SpawnedProcess { pid })
    }
}

/// The natives directory prepended to the platform's library search path.
pub fn native_library_env(platform: &Platform, natives_dir: &Path) -> (OsString, OsString) {
    let var = match platform.os {
        OsName::Windows => "PATH",
        OsName::Linux => "LD_LIBRARY_PATH",
        OsName::Osx => "DYLD_LIBRARY_PATH",
    };
    let separator = match platform.os {
        OsName::Windows => ";",
        OsName::Linux | OsName::Osx => ":",
    };
    let native_path = path_arg(natives_dir);
    let merged = match std::env::var(var) {
        Ok(existing) if !existing.trim().is_empty() => {
            format!("{}{}{}", native_path, separator, existing)
        }
        _ => native_path,
    };
    (OsString::from(var), OsString::from(merged))
}

fn configure_platform_spawn(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        const DETACHED_PROCESS: u32 = 0x00000008;
        cmd.creation_flags(DETACHED_PROCESS);
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = cmd;
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
