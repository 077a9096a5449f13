use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::checksum::{digests_match, file_sha1};
use super::progress::ProgressTracker;
use super::retry::RetryPolicy;
use super::task::{DownloadTask, TaskStatus};

/// How a task reached `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A verified file was already in place; nothing was transferred.
    Cached,
    Downloaded { bytes: u64 },
}

/// Downloads one task at a time with size + SHA-1 verification.
///
/// Bytes go to `<dest>.part` and are renamed onto `dest` only once they
/// verify, so `dest` never holds a wrong file written by this fetcher.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Bring `task.dest` to a verified state, updating `task.status`.
    pub async fn fetch(
        &self,
        task: &mut DownloadTask,
        cancel: &CancellationToken,
        progress: Option<&ProgressTracker>,
    ) -> LauncherResult<FetchOutcome> {
        set_status(task, TaskStatus::InProgress, progress);
        task.error = None;
        task.attempts = 0;

        match self.reuse_existing(task, progress).await {
            Ok(true) => {
                debug!("Already cached: {:?}", task.dest);
                set_status(task, TaskStatus::Done, progress);
                return Ok(FetchOutcome::Cached);
            }
            Ok(false) => {}
            Err(e) => return Err(fail(task, e, progress)),
        }

        loop {
            if cancel.is_cancelled() {
                return Err(fail(task, LauncherError::Cancelled, progress));
            }

            task.attempts += 1;
            match self.transfer(task, cancel, progress).await {
                Ok(bytes) => {
                    debug!(
                        "Downloaded {} -> {:?} ({} bytes, attempt {})",
                        task.url, task.dest, bytes, task.attempts
                    );
                    set_status(task, TaskStatus::Done, progress);
                    return Ok(FetchOutcome::Downloaded { bytes });
                }
                Err(e) if worth_retrying(&e) && task.attempts < self.retry.attempts => {
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}",
                        task.name, task.attempts, self.retry.attempts, e
                    );
                    let delay = self.retry.delay_after(task.attempts);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(fail(task, LauncherError::Cancelled, progress));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    if !matches!(e, LauncherError::Cancelled) {
                        error!(
                            "Giving up on {} after {} attempt(s): {}",
                            task.name, task.attempts, e
                        );
                    }
                    return Err(fail(task, e, progress));
                }
            }
        }
    }

    /// Accept a file already at `dest`, or a complete `.part` left behind by
    /// an interrupted rename, when it verifies. Anything else at `dest` is
    /// removed.
    async fn reuse_existing(
        &self,
        task: &DownloadTask,
        progress: Option<&ProgressTracker>,
    ) -> LauncherResult<bool> {
        if let Ok(meta) = tokio::fs::metadata(&task.dest).await {
            if meta.is_file() {
                if verify_on_disk(task, &task.dest, meta.len()).await? {
                    if let Some(p) = progress {
                        p.add_bytes(meta.len());
                    }
                    return Ok(true);
                }
                warn!("Discarding invalid cached file {:?}", task.dest);
                remove_if_exists(&task.dest).await?;
            }
        }

        // Only a part file of exactly the expected size and digest counts.
        if let (Some(size), Some(_)) = (task.size, task.sha1.as_ref()) {
            let temp = task.temp_path();
            if let Ok(meta) = tokio::fs::metadata(&temp).await {
                if meta.len() == size && verify_on_disk(task, &temp, meta.len()).await? {
                    tokio::fs::rename(&temp, &task.dest)
                        .await
                        .map_err(|e| LauncherError::io(&task.dest, e))?;
                    if let Some(p) = progress {
                        p.add_bytes(size);
                    }
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// One transfer attempt. Returns the number of bytes written.
    async fn transfer(
        &self,
        task: &DownloadTask,
        cancel: &CancellationToken,
        progress: Option<&ProgressTracker>,
    ) -> LauncherResult<u64> {
        if let Some(parent) = task.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let temp = task.temp_path();
        let mut written = 0u64;
        let result = self
            .stream_to_temp(task, &temp, cancel, progress, &mut written)
            .await
            .and_then(|digest| verify_transfer(task, written, &digest));

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&temp).await;
            if let Some(p) = progress {
                p.discard_bytes(written);
            }
            return Err(e);
        }

        tokio::fs::rename(&temp, &task.dest)
            .await
            .map_err(|e| LauncherError::io(&task.dest, e))?;
        Ok(written)
    }

    async fn stream_to_temp(
        &self,
        task: &DownloadTask,
        temp: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressTracker>,
        written: &mut u64,
    ) -> LauncherResult<String> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
            response = self.client.get(&task.url).send() => {
                response.map_err(|e| transport(&task.url, e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::TransportFailure {
                url: task.url.clone(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        // The handle is dropped at the end of this scope, before the rename.
        let mut file = tokio::fs::File::create(temp)
            .await
            .map_err(|e| LauncherError::io(temp, e))?;
        let mut hasher = Sha1::new();
        let mut stream = response.bytes_stream();

        loop {
            // A stalled body must not outlive a cancel.
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| transport(&task.url, e))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io(temp, e))?;
            *written += chunk.len() as u64;
            if let Some(p) = progress {
                p.add_bytes(chunk.len() as u64);
            }
        }

        file.flush().await.map_err(|e| LauncherError::io(temp, e))?;
        Ok(hex::encode(hasher.finalize()))
    }
}

fn worth_retrying(e: &LauncherError) -> bool {
    e.is_retryable() || matches!(e, LauncherError::IntegrityFailure { .. })
}

fn transport(url: &str, e: reqwest::Error) -> LauncherError {
    LauncherError::TransportFailure {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

fn verify_transfer(task: &DownloadTask, written: u64, digest: &str) -> LauncherResult<()> {
    if let Some(size) = task.size {
        if size != written {
            return Err(LauncherError::IntegrityFailure {
                path: task.dest.clone(),
                expected: format!("{} bytes", size),
                actual: format!("{} bytes", written),
            });
        }
    }
    if let Some(expected) = &task.sha1 {
        if !digests_match(expected, digest) {
            return Err(LauncherError::IntegrityFailure {
                path: task.dest.clone(),
                expected: expected.clone(),
                actual: digest.to_string(),
            });
        }
    }
    Ok(())
}

async fn verify_on_disk(task: &DownloadTask, path: &Path, len: u64) -> LauncherResult<bool> {
    if task.size.is_some_and(|size| size != len) {
        return Ok(false);
    }
    match &task.sha1 {
        Some(expected) => Ok(digests_match(expected, &file_sha1(path).await?)),
        None => Ok(true),
    }
}

async fn remove_if_exists(path: &Path) -> LauncherResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LauncherError::io(path, e)),
    }
}

fn set_status(task: &mut DownloadTask, to: TaskStatus, progress: Option<&ProgressTracker>) {
    if let Some(p) = progress {
        p.transition(task.status, to);
    }
    task.status = to;
}

fn fail(
    task: &mut DownloadTask,
    e: LauncherError,
    progress: Option<&ProgressTracker>,
) -> LauncherError {
    task.error = Some(e.to_string());
    set_status(task, TaskStatus::Failed, progress);
    e
}
