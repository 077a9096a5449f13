use std::path::PathBuf;

use reqwest::Client;
use tracing::info;

use crate::core::downloader::orchestrator::default_concurrency;
use crate::core::error::LauncherResult;
use crate::core::events::EventBus;
use crate::core::http::build_http_client;
use crate::core::version::Platform;

use super::layout::CacheLayout;
use super::settings::LauncherSettings;

/// Everything a launch needs that outlives a single attempt. Built once by
/// the caller and handed to the orchestrator; nothing here is global.
#[derive(Clone)]
pub struct LauncherContext {
    pub layout: CacheLayout,
    pub settings: LauncherSettings,
    pub http_client: Client,
    pub events: EventBus,
    pub platform: Platform,
}

impl LauncherContext {
    /// Context rooted at `data_dir`, with settings read from it.
    pub fn new(data_dir: impl Into<PathBuf>) -> LauncherResult<Self> {
        let layout = CacheLayout::new(data_dir);
        let settings = LauncherSettings::load(&layout.settings_path());
        info!("Using data directory {:?}", layout.root());

        Ok(Self {
            layout,
            settings,
            http_client: build_http_client()?,
            events: EventBus::new(),
            platform: Platform::current(),
        })
    }

    /// Context rooted at the platform data directory.
    pub fn with_default_dir() -> LauncherResult<Self> {
        Self::new(CacheLayout::default_root())
    }

    pub fn with_settings(mut self, settings: LauncherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    pub fn download_concurrency(&self) -> usize {
        self.settings
            .download_concurrency
            .filter(|n| *n > 0)
            .unwrap_or_else(default_concurrency)
    }

    pub fn save_settings(&self) -> LauncherResult<()> {
        self.settings.save(&self.layout.settings_path())
    }
}
