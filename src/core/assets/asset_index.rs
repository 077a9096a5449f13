use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadTask, TaskKind};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::{is_contained, CacheLayout};
use crate::core::version::VersionDescriptor;

pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Asset index JSON: logical resource name → content-addressed object.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndex {
    pub objects: BTreeMap<String, AssetObject>,
    /// Pre-1.7 indexes expect a flat copy of every object by name.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// Objects are addressed by a 40 character hex SHA-1.
    fn has_valid_hash(&self) -> bool {
        self.hash.len() == 40 && self.hash.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl AssetIndex {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        serde_json::from_str(raw).map_err(|e| LauncherError::ManifestMalformed(e.to_string()))
    }

    pub async fn load(path: &Path) -> LauncherResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        Self::parse(&raw)
    }

    /// Task fetching the index document itself, if the descriptor has one.
    pub fn index_task(descriptor: &VersionDescriptor, layout: &CacheLayout) -> Option<DownloadTask> {
        let info = descriptor.asset_index.as_ref()?;
        Some(DownloadTask::new(
            format!("asset index {}", info.id),
            TaskKind::Resource,
            info.url.clone(),
            layout.asset_index_path(&info.id),
            info.sha1.clone(),
            info.size,
        ))
    }

    /// One task per distinct object. Several names may share a hash; the
    /// object is fetched once.
    pub fn resource_tasks(&self, layout: &CacheLayout, resources_base: &str) -> Vec<DownloadTask> {
        let base = resources_base.trim_end_matches('/');
        let mut seen = std::collections::HashSet::new();
        let mut tasks = Vec::new();

        for (name, obj) in &self.objects {
            if !obj.has_valid_hash() {
                warn!("Skipping asset {} with malformed hash {:?}", name, obj.hash);
                continue;
            }
            if !seen.insert(obj.hash.as_str()) {
                continue;
            }
            let prefix = &obj.hash[..2];
            tasks.push(DownloadTask::new(
                name.clone(),
                TaskKind::Resource,
                format!("{}/{}/{}", base, prefix, obj.hash),
                layout.asset_object_path(&obj.hash),
                Some(obj.hash.clone()),
                Some(obj.size),
            ));
        }

        tasks
    }

    pub fn total_size(&self) -> u64 {
        self.objects.values().map(|o| o.size).sum()
    }

    /// Copy objects to their logical names for indexes marked `virtual` or
    /// `map_to_resources`. Existing copies are kept.
    pub async fn materialize_virtual(&self, layout: &CacheLayout) -> LauncherResult<()> {
        if !self.is_virtual && !self.map_to_resources {
            return Ok(());
        }

        let target_root = layout.legacy_assets_dir();
        let mut copied = 0usize;
        for (name, obj) in &self.objects {
            let relative: PathBuf = name.split('/').collect();
            if !is_contained(&relative) || !obj.has_valid_hash() {
                warn!("Skipping asset with unsafe name or hash: {:?}", name);
                continue;
            }
            let target = target_root.join(relative);
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                continue;
            }
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| LauncherError::io(parent, e))?;
            }
            let source = layout.asset_object_path(&obj.hash);
            tokio::fs::copy(&source, &target)
                .await
                .map_err(|e| LauncherError::io(&source, e))?;
            copied += 1;
        }

        if copied > 0 {
            info!("Copied {} legacy assets to {:?}", copied, target_root);
        } else {
            debug!("Legacy assets already in place");
        }
        Ok(())
    }
}
