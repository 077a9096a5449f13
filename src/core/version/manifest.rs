// ─── Version Manifest ───
// Handles fetching and parsing the remote version list.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level version manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: Option<LatestVersions>,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    pub url: String,
    #[serde(default)]
    pub release_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    /// Fetch the manifest once. Transport problems and non-success statuses
    /// surface as `ManifestUnavailable`, unparseable bodies as
    /// `ManifestMalformed`.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<Self> {
        info!("Fetching version manifest from {}", url);

        let raw = fetch_document(client, url).await?;
        let manifest = Self::parse(&raw)?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    pub fn parse(raw: &str) -> LauncherResult<Self> {
        serde_json::from_str(raw).map_err(|e| LauncherError::ManifestMalformed(e.to_string()))
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Identifiers in manifest order (newest first).
    pub fn ids(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.id.clone()).collect()
    }

    /// Only stable releases.
    pub fn releases(&self) -> impl Iterator<Item = &VersionEntry> {
        self.versions.iter().filter(|v| v.version_type == "release")
    }
}

/// GET a JSON document as text, classifying failures as manifest errors.
pub(crate) async fn fetch_document(client: &reqwest::Client, url: &str) -> LauncherResult<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LauncherError::ManifestUnavailable(format!("{}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::ManifestUnavailable(format!(
            "{}: HTTP {}",
            url,
            status.as_u16()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| LauncherError::ManifestUnavailable(format!("{}: {}", url, e)))
}
