// ─── Download Orchestrator ───
// Expands a resolved descriptor into fetch tasks and runs them on a bounded
// worker pool.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::assets::{AssetIndex, RESOURCES_URL};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventBus, LifecycleEvent, Stage};
use crate::core::state::CacheLayout;
use crate::core::version::{Platform, VersionDescriptor};

use super::fetcher::{FetchOutcome, Fetcher};
use super::progress::{ProgressSnapshot, ProgressTracker};
use super::task::{DownloadTask, TaskKind, TaskStatus};

/// Upper bound on parallel transfers regardless of core count.
pub const MAX_DEFAULT_CONCURRENCY: usize = 8;

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_DEFAULT_CONCURRENCY)
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub tasks: Vec<DownloadTask>,
    /// Tasks that needed a network transfer.
    pub transferred: usize,
    /// Tasks satisfied by files already in the cache.
    pub cached: usize,
    pub snapshot: ProgressSnapshot,
}

pub struct DownloadOrchestrator {
    fetcher: Arc<Fetcher>,
    platform: Platform,
    concurrency: usize,
    resources_base: String,
    bus: Option<EventBus>,
}

impl DownloadOrchestrator {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            platform: Platform::current(),
            concurrency: default_concurrency(),
            resources_base: RESOURCES_URL.to_string(),
            bus: None,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_resources_base(mut self, base: impl Into<String>) -> Self {
        self.resources_base = base.into();
        self
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Client jar, applicable libraries (and their natives) and the given
    /// resources. Entries sharing a destination are fetched once.
    pub fn plan(
        &self,
        descriptor: &VersionDescriptor,
        layout: &CacheLayout,
        assets: Option<&AssetIndex>,
    ) -> LauncherResult<Vec<DownloadTask>> {
        let mut tasks = Vec::new();

        let client = descriptor.client_download()?;
        tasks.push(DownloadTask::new(
            format!("{} client", descriptor.id),
            TaskKind::ClientJar,
            client.url.clone(),
            layout.client_jar_path(&descriptor.id),
            client.sha1.clone(),
            client.size,
        ));

        let libs_dir = layout.libraries_dir();
        for lib in descriptor.applicable_libraries(&self.platform) {
            if let Some(artifact) = lib.artifact()? {
                tasks.push(DownloadTask::new(
                    artifact.name,
                    TaskKind::Library,
                    artifact.url,
                    libs_dir.join(&artifact.path),
                    artifact.sha1,
                    artifact.size,
                ));
            }
            if let Some(native) = lib.native_artifact(&self.platform)? {
                tasks.push(DownloadTask::new(
                    native.name,
                    TaskKind::Native,
                    native.url,
                    libs_dir.join(&native.path),
                    native.sha1,
                    native.size,
                ));
            }
        }

        if let Some(index) = assets {
            tasks.extend(index.resource_tasks(layout, &self.resources_base));
        }

        let mut seen = HashSet::new();
        tasks.retain(|t| seen.insert(t.dest.clone()));
        Ok(tasks)
    }

    /// Make every artifact of `descriptor` present and verified under
    /// `layout`. Succeeds only when every task ends `done`; verified files
    /// stay cached either way, so running again only retries what failed.
    pub async fn run(
        &self,
        descriptor: &VersionDescriptor,
        layout: &CacheLayout,
        cancel: &CancellationToken,
    ) -> LauncherResult<DownloadReport> {
        self.publish(LifecycleEvent::Started {
            stage: Stage::Download,
        });

        let result = self.run_inner(descriptor, layout, cancel).await;

        match &result {
            Ok(report) => {
                info!(
                    "Download of {} complete: {} tasks ({} transferred, {} cached)",
                    descriptor.id,
                    report.tasks.len(),
                    report.transferred,
                    report.cached
                );
                self.publish(LifecycleEvent::Succeeded {
                    stage: Stage::Download,
                });
            }
            Err(e) => {
                warn!("Download of {} failed: {}", descriptor.id, e);
                self.publish(LifecycleEvent::Failed {
                    stage: Stage::Download,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_inner(
        &self,
        descriptor: &VersionDescriptor,
        layout: &CacheLayout,
        cancel: &CancellationToken,
    ) -> LauncherResult<DownloadReport> {
        let assets = self.fetch_asset_index(descriptor, layout, cancel).await?;
        let tasks = self.plan(descriptor, layout, assets.as_ref())?;

        let total_bytes = tasks.iter().filter_map(|t| t.size).sum();
        let tracker = ProgressTracker::new(tasks.len(), total_bytes, self.bus.clone());

        info!(
            "Starting download of {}: {} tasks, {} bytes, concurrency={}",
            descriptor.id,
            tasks.len(),
            total_bytes,
            self.concurrency
        );

        let tracker_ref = &tracker;
        let results: Vec<(DownloadTask, Option<FetchOutcome>)> = stream::iter(tasks)
            .map(|mut task| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    // Stop handing out work once cancelled; in-flight
                    // transfers notice the token between chunks.
                    if cancel.is_cancelled() {
                        return (task, None);
                    }
                    let outcome = fetcher.fetch(&mut task, cancel, Some(tracker_ref)).await.ok();
                    (task, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }

        let mut transferred = 0;
        let mut cached = 0;
        let mut finished = Vec::with_capacity(results.len());
        for (task, outcome) in results {
            match outcome {
                Some(FetchOutcome::Downloaded { .. }) => transferred += 1,
                Some(FetchOutcome::Cached) => cached += 1,
                None => {}
            }
            finished.push(task);
        }

        let failed: Vec<_> = finished
            .iter()
            .filter(|t| t.status != TaskStatus::Done)
            .map(DownloadTask::to_failed)
            .collect();
        if !failed.is_empty() {
            for f in &failed {
                warn!(
                    "Failed task {} ({}) after {} attempt(s): {}",
                    f.name, f.url, f.attempts, f.reason
                );
            }
            return Err(LauncherError::IncompleteDownload {
                total: finished.len(),
                failed,
            });
        }

        if let Some(index) = &assets {
            index.materialize_virtual(layout).await?;
        }

        Ok(DownloadReport {
            snapshot: tracker.snapshot(),
            tasks: finished,
            transferred,
            cached,
        })
    }

    /// The asset index must be in place before resource tasks can be known.
    async fn fetch_asset_index(
        &self,
        descriptor: &VersionDescriptor,
        layout: &CacheLayout,
        cancel: &CancellationToken,
    ) -> LauncherResult<Option<AssetIndex>> {
        let Some(mut task) = AssetIndex::index_task(descriptor, layout) else {
            debug!("{} has no asset index", descriptor.id);
            return Ok(None);
        };

        match self.fetcher.fetch(&mut task, cancel, None).await {
            Ok(_) => {}
            Err(LauncherError::Cancelled) => return Err(LauncherError::Cancelled),
            Err(_) => {
                return Err(LauncherError::IncompleteDownload {
                    total: 1,
                    failed: vec![task.to_failed()],
                })
            }
        }

        AssetIndex::load(&task.dest).await.map(Some)
    }

    fn publish(&self, event: LifecycleEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }
}
