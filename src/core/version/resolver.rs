// ─── Version Resolver ───
// Turns a version id into a fully merged descriptor. Cached descriptors are
// used as-is; the remote manifest is consulted for ids not on disk.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::downloader::checksum::{digests_match, sha1_hex};
use crate::core::downloader::RetryPolicy;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::CacheLayout;

use super::manifest::{fetch_document, VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
use super::merge::merge;
use super::version_file::{VersionDescriptor, SUPPORTED_LAUNCHER_VERSION};

pub struct VersionResolver {
    client: Client,
    layout: CacheLayout,
    manifest_url: String,
    retry: RetryPolicy,
    manifest: Mutex<Option<Arc<VersionManifest>>>,
}

impl VersionResolver {
    pub fn new(client: Client, layout: CacheLayout) -> Self {
        Self {
            client,
            layout,
            manifest_url: VERSION_MANIFEST_URL.to_string(),
            retry: RetryPolicy::default(),
            manifest: Mutex::new(None),
        }
    }

    pub fn with_manifest_url(mut self, url: impl Into<String>) -> Self {
        self.manifest_url = url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the manifest again and remember it.
    pub async fn refresh_manifest(&self) -> LauncherResult<Arc<VersionManifest>> {
        let manifest = self
            .retry
            .run("version manifest", || {
                VersionManifest::fetch(&self.client, &self.manifest_url)
            })
            .await?;
        let manifest = Arc::new(manifest);
        *self.manifest.lock().await = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    /// The manifest fetched earlier by this resolver, or a fresh one.
    pub async fn manifest(&self) -> LauncherResult<Arc<VersionManifest>> {
        if let Some(manifest) = self.manifest.lock().await.as_ref() {
            return Ok(Arc::clone(manifest));
        }
        self.refresh_manifest().await
    }

    /// Version ids in manifest order, newest first. Always hits the network.
    pub async fn list_versions(&self) -> LauncherResult<Vec<String>> {
        Ok(self.refresh_manifest().await?.ids())
    }

    /// Resolve `id` and every ancestor it inherits from, merged root first.
    pub async fn resolve(&self, id: &str) -> LauncherResult<VersionDescriptor> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id.to_string());

        while let Some(current) = next {
            if !seen.insert(current.clone()) {
                return Err(LauncherError::ManifestMalformed(format!(
                    "inheritance cycle through {}",
                    current
                )));
            }
            let descriptor = self.resolve_single(&current).await?;
            next = descriptor.inherits_from.clone();
            chain.push(descriptor);
        }

        let mut merged = match chain.pop() {
            Some(root) => root,
            None => return Err(LauncherError::VersionNotFound(id.to_string())),
        };
        while let Some(child) = chain.pop() {
            debug!("Merging {} onto {}", child.id, merged.id);
            merged = merge(&merged, &child);
        }

        if let Some(required) = merged.minimum_launcher_version {
            if required > SUPPORTED_LAUNCHER_VERSION {
                warn!(
                    "{} asks for launcher version {} (this launcher speaks {})",
                    merged.id, required, SUPPORTED_LAUNCHER_VERSION
                );
            }
        }

        info!(
            "Resolved {} ({} libraries, main class {:?})",
            merged.id,
            merged.libraries.len(),
            merged.main_class
        );
        Ok(merged)
    }

    /// One descriptor, without following `inheritsFrom`.
    ///
    /// A cached descriptor wins without touching the network unless a
    /// manifest already loaded by this resolver lists the id with a digest
    /// the cached copy does not match.
    async fn resolve_single(&self, id: &str) -> LauncherResult<VersionDescriptor> {
        let local_path = self.layout.descriptor_path(id);
        let local = load_local(&local_path).await;

        if let Some((descriptor, raw)) = &local {
            let known = self.loaded_manifest().await;
            let stale = known
                .as_ref()
                .and_then(|m| m.find_version(id))
                .and_then(|entry| entry.sha1.as_deref())
                .map(|expected| !digests_match(expected, &sha1_hex(raw.as_bytes())))
                .unwrap_or(false);
            if !stale {
                debug!("Using cached descriptor for {}", id);
                return Ok(descriptor.clone());
            }
            info!("Cached descriptor for {} is out of date", id);
        }
        let local = local.map(|(descriptor, _)| descriptor);

        let manifest = match self.manifest().await {
            Ok(manifest) => manifest,
            Err(e) => {
                return match local {
                    Some(descriptor) => {
                        warn!("Manifest unavailable ({}), using cached {}", e, id);
                        Ok(descriptor)
                    }
                    None => Err(e),
                };
            }
        };

        let Some(entry) = manifest.find_version(id) else {
            return Err(LauncherError::VersionNotFound(id.to_string()));
        };

        match self.fetch_descriptor(entry).await {
            Ok((descriptor, raw)) => {
                write_atomically(&local_path, raw.as_bytes()).await?;
                Ok(descriptor)
            }
            Err(e) if e.is_retryable() && local.is_some() => {
                warn!("Refreshing {} failed ({}), using cached copy", id, e);
                local.ok_or_else(|| LauncherError::VersionNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn loaded_manifest(&self) -> Option<Arc<VersionManifest>> {
        self.manifest.lock().await.as_ref().map(Arc::clone)
    }

    async fn fetch_descriptor(
        &self,
        entry: &VersionEntry,
    ) -> LauncherResult<(VersionDescriptor, String)> {
        info!("Fetching descriptor for {} from {}", entry.id, entry.url);
        let raw = self
            .retry
            .run(&format!("descriptor {}", entry.id), || {
                fetch_document(&self.client, &entry.url)
            })
            .await?;

        if let Some(expected) = &entry.sha1 {
            let actual = sha1_hex(raw.as_bytes());
            if !digests_match(expected, &actual) {
                return Err(LauncherError::IntegrityFailure {
                    path: self.layout.descriptor_path(&entry.id),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let descriptor = VersionDescriptor::parse(&raw)?;
        Ok((descriptor, raw))
    }
}

/// A cached descriptor that cannot be read or parsed is treated as absent.
async fn load_local(path: &Path) -> Option<(VersionDescriptor, String)> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match VersionDescriptor::parse(&raw) {
        Ok(descriptor) => Some((descriptor, raw)),
        Err(e) => {
            warn!("Ignoring unreadable cached descriptor {:?}: {}", path, e);
            None
        }
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".part");
    tokio::fs::write(&temp, bytes)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| LauncherError::io(path, e))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;

    use super::*;

    fn resolver(server: &MockServer, layout: CacheLayout) -> VersionResolver {
        VersionResolver::new(Client::new(), layout)
            .with_manifest_url(server.url("/manifest.json"))
            .with_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    fn manifest_body(server: &MockServer) -> String {
        serde_json::json!({
            "latest": {"release": "1.8", "snapshot": "15w14a"},
            "versions": [
                {"id": "15w14a", "type": "snapshot", "url": server.url("/15w14a.json")},
                {"id": "1.8", "type": "release", "url": server.url("/1.8.json")}
            ]
        })
        .to_string()
    }

    const DESCRIPTOR_18: &str = r#"{
        "id": "1.8",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "minimumLauncherVersion": 14,
        "libraries": [
            {"name": "com.mojang:authlib:1.5.21"},
            {"name": "org.lwjgl.lwjgl:lwjgl:2.9.4"}
        ]
    }"#;

    async fn write_local(layout: &CacheLayout, id: &str, body: &str) {
        let path = layout.descriptor_path(id);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, body).await.unwrap();
    }

    #[tokio::test]
    async fn list_versions_keeps_manifest_order() {
        let server = MockServer::start_async().await;
        let body = manifest_body(&server);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(200).body(body);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ids = resolver(&server, CacheLayout::new(dir.path()))
            .list_versions()
            .await
            .unwrap();
        assert_eq!(ids, vec!["15w14a", "1.8"]);
    }

    #[tokio::test]
    async fn resolve_fetches_and_caches_descriptor() {
        let server = MockServer::start_async().await;
        let body = manifest_body(&server);
        let manifest = server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(200).body(body);
            })
            .await;
        let descriptor = server
            .mock_async(|when, then| {
                when.method(GET).path("/1.8.json");
                then.status(200).body(DESCRIPTOR_18);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        let resolved = resolver(&server, layout.clone())
            .resolve("1.8")
            .await
            .unwrap();

        assert_eq!(resolved.id, "1.8");
        assert_eq!(resolved.libraries.len(), 2);
        assert!(layout.descriptor_path("1.8").exists());
        manifest.assert_hits_async(1).await;
        descriptor.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn cached_descriptor_resolves_without_network() {
        let server = MockServer::start_async().await;
        let manifest = server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(503);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        write_local(&layout, "1.8", DESCRIPTOR_18).await;

        let resolved = resolver(&server, layout).resolve("1.8").await.unwrap();
        assert_eq!(resolved.main_class().unwrap(), "net.minecraft.client.main.Main");
        manifest.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn local_only_version_resolves_with_server_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        write_local(
            &layout,
            "forge-1.8",
            r#"{"id": "forge-1.8", "mainClass": "net.minecraft.launchwrapper.Launch"}"#,
        )
        .await;

        // Nothing listens on the discard port; a backoff would make this slow.
        let resolver = VersionResolver::new(Client::new(), layout)
            .with_manifest_url("http://127.0.0.1:9/manifest.json")
            .with_retry(RetryPolicy::new(3, Duration::from_secs(30)));

        let resolved = tokio::time::timeout(Duration::from_secs(5), resolver.resolve("forge-1.8"))
            .await
            .expect("resolution must not wait on the network")
            .unwrap();
        assert_eq!(resolved.main_class().unwrap(), "net.minecraft.launchwrapper.Launch");
    }

    #[tokio::test]
    async fn stale_cached_descriptor_is_refetched_once_manifest_is_loaded() {
        let server = MockServer::start_async().await;
        let body = serde_json::json!({
            "versions": [{
                "id": "1.8",
                "type": "release",
                "url": server.url("/1.8.json"),
                "sha1": sha1_hex(DESCRIPTOR_18.as_bytes())
            }]
        })
        .to_string();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(200).body(body);
            })
            .await;
        let descriptor = server
            .mock_async(|when, then| {
                when.method(GET).path("/1.8.json");
                then.status(200).body(DESCRIPTOR_18);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        write_local(&layout, "1.8", r#"{"id": "1.8", "mainClass": "old.Main"}"#).await;

        let resolver = resolver(&server, layout.clone());
        assert_eq!(
            resolver.resolve("1.8").await.unwrap().main_class().unwrap(),
            "old.Main"
        );
        descriptor.assert_hits_async(0).await;

        resolver.list_versions().await.unwrap();
        let refreshed = resolver.resolve("1.8").await.unwrap();
        assert_eq!(refreshed.main_class().unwrap(), "net.minecraft.client.main.Main");
        descriptor.assert_hits_async(1).await;

        // The rewritten cache now matches the manifest digest.
        resolver.resolve("1.8").await.unwrap();
        descriptor.assert_hits_async(1).await;
        let cached = tokio::fs::read_to_string(layout.descriptor_path("1.8")).await.unwrap();
        assert_eq!(cached, DESCRIPTOR_18);
    }

    #[tokio::test]
    async fn manifest_unavailable_without_cache_propagates() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(500);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = resolver(&server, CacheLayout::new(dir.path()))
            .resolve("1.8")
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ManifestUnavailable(_)));
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let server = MockServer::start_async().await;
        let body = manifest_body(&server);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(200).body(body);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = resolver(&server, CacheLayout::new(dir.path()))
            .resolve("9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound(id) if id == "9.9.9"));
    }

    #[tokio::test]
    async fn malformed_descriptor_is_a_hard_failure() {
        let server = MockServer::start_async().await;
        let body = manifest_body(&server);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(200).body(body);
            })
            .await;
        let descriptor = server
            .mock_async(|when, then| {
                when.method(GET).path("/1.8.json");
                then.status(200).body("{\"id\": ");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = resolver(&server, CacheLayout::new(dir.path()))
            .resolve("1.8")
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ManifestMalformed(_)));
        descriptor.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn local_child_inherits_from_remote_parent() {
        let server = MockServer::start_async().await;
        let body = manifest_body(&server);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(200).body(body);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/1.8.json");
                then.status(200).body(DESCRIPTOR_18);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        write_local(
            &layout,
            "1.8-custom",
            r#"{
                "id": "1.8-custom",
                "inheritsFrom": "1.8",
                "mainClass": "com.example.Launch",
                "libraries": [
                    {"name": "org.lwjgl.lwjgl:lwjgl:2.9.5"},
                    {"name": "com.example:tweaks:1.0"}
                ]
            }"#,
        )
        .await;

        let resolved = resolver(&server, layout).resolve("1.8-custom").await.unwrap();
        assert_eq!(resolved.id, "1.8-custom");
        assert_eq!(resolved.inherits_from, None);
        assert_eq!(resolved.main_class().unwrap(), "com.example.Launch");
        let names: Vec<_> = resolved.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "com.mojang:authlib:1.5.21",
                "org.lwjgl.lwjgl:lwjgl:2.9.5",
                "com.example:tweaks:1.0"
            ]
        );
    }

    #[tokio::test]
    async fn inheritance_cycle_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifest.json");
                then.status(200).body(r#"{"versions": []}"#);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        write_local(&layout, "a", r#"{"id": "a", "inheritsFrom": "b"}"#).await;
        write_local(&layout, "b", r#"{"id": "b", "inheritsFrom": "a"}"#).await;

        let err = resolver(&server, layout).resolve("a").await.unwrap_err();
        assert!(matches!(err, LauncherError::ManifestMalformed(_)));
    }
}
