use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::error::FailedTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in-progress"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What kind of artifact a task fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ClientJar,
    Library,
    Native,
    Resource,
}

/// A single file to fetch. Owned and mutated by the fetcher working on it.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub name: String,
    pub kind: TaskKind,
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
    pub status: TaskStatus,
    /// Transfer attempts made by the last fetch.
    pub attempts: u32,
    /// Last failure, kept for reporting.
    pub error: Option<String>,
}

impl DownloadTask {
    pub fn new(
        name: impl Into<String>,
        kind: TaskKind,
        url: impl Into<String>,
        dest: impl Into<PathBuf>,
        sha1: Option<String>,
        size: Option<u64>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
            dest: dest.into(),
            sha1,
            size,
            status: TaskStatus::Pending,
            attempts: 0,
            error: None,
        }
    }

    /// Where bytes land before verification. Only a verified rename makes
    /// `dest` appear.
    pub fn temp_path(&self) -> PathBuf {
        let mut raw: OsString = self.dest.clone().into_os_string();
        raw.push(".part");
        PathBuf::from(raw)
    }

    pub fn to_failed(&self) -> FailedTask {
        FailedTask {
            name: self.name.clone(),
            url: self.url.clone(),
            dest: self.dest.clone(),
            attempts: self.attempts,
            reason: self.error.clone().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl fmt::Display for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_sits_next_to_destination() {
        let task = DownloadTask::new(
            "com.example:a:1.0",
            TaskKind::Library,
            "https://example.com/a-1.0.jar",
            "/cache/libraries/com/example/a/1.0/a-1.0.jar",
            None,
            None,
        );
        assert_eq!(
            task.temp_path(),
            PathBuf::from("/cache/libraries/com/example/a/1.0/a-1.0.jar.part")
        );
        assert_eq!(task.status, TaskStatus::Pending);
    }
}
