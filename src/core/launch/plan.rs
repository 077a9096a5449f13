// ─── Launch Plan ───
// Everything needed to start the game, computed from the descriptor, the
// cache layout and the session. Nothing here touches the disk.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::auth::Session;
use crate::core::error::LauncherResult;
use crate::core::state::{CacheLayout, LauncherSettings, Resolution, ServerAddress};
use crate::core::version::{Features, Platform, VersionDescriptor};

use super::arguments::Substitutions;
use super::classpath::{build_classpath, join_classpath, path_arg};

/// Per-launch choices that shape the argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub max_memory_mb: u32,
    pub resolution: Option<Resolution>,
    pub fullscreen: bool,
    pub server: Option<ServerAddress>,
    pub demo: bool,
    pub launcher_name: String,
    pub launcher_version: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::from_settings(&LauncherSettings::default())
    }
}

impl LaunchOptions {
    pub fn from_settings(settings: &LauncherSettings) -> Self {
        Self {
            max_memory_mb: settings.max_memory_mb,
            resolution: settings.resolution,
            fullscreen: settings.fullscreen,
            server: settings.server_address(),
            demo: false,
            launcher_name: settings.launcher_name.clone(),
            launcher_version: settings.launcher_version.clone(),
        }
    }

    /// Features argument clauses are evaluated against.
    pub fn features(&self) -> Features {
        let mut features = Features::default();
        if self.resolution.is_some() {
            features.enable("has_custom_resolution");
        }
        if self.demo {
            features.enable("is_demo_user");
        }
        features
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub version_id: String,
    pub main_class: String,
    pub classpath: Vec<PathBuf>,
    pub natives_dir: PathBuf,
    pub jvm_args: Vec<String>,
    pub game_args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchPlan {
    /// JVM arguments, main class, then game arguments.
    pub fn command_line(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.jvm_args.len() + 1 + self.game_args.len());
        args.extend(self.jvm_args.iter().cloned());
        args.push(self.main_class.clone());
        args.extend(self.game_args.iter().cloned());
        args
    }
}

/// Build the launch plan. The same inputs always give the same plan.
pub fn build(
    descriptor: &VersionDescriptor,
    layout: &CacheLayout,
    session: &Session,
    options: &LaunchOptions,
    platform: &Platform,
) -> LauncherResult<LaunchPlan> {
    let main_class = descriptor.main_class()?.to_string();
    let classpath = build_classpath(descriptor, layout, platform)?;
    let natives_dir = layout.natives_dir(&descriptor.id);
    let features = options.features();

    let mut subs = Substitutions::new();
    subs.bind_present("auth_player_name", &session.username)
        .bind_present("auth_uuid", &session.profile_id)
        .bind_present("auth_access_token", &session.access_token)
        .bind_present("clientid", &session.client_token)
        .bind("auth_xuid", "0")
        .bind("user_type", "mojang")
        .bind("user_properties", "{}")
        .bind("version_name", descriptor.id.clone())
        .bind("version_type", descriptor.version_type())
        .bind("game_directory", path_arg(&layout.game_dir()))
        .bind("assets_root", path_arg(&layout.assets_dir()))
        .bind("game_assets", path_arg(&layout.legacy_assets_dir()))
        .bind("assets_index_name", descriptor.asset_index_name())
        .bind("natives_directory", path_arg(&natives_dir))
        .bind("library_directory", path_arg(&layout.libraries_dir()))
        .bind("classpath", join_classpath(&classpath, platform))
        .bind("classpath_separator", platform.classpath_separator())
        .bind("launcher_name", options.launcher_name.clone())
        .bind("launcher_version", options.launcher_version.clone());
    if !session.access_token.trim().is_empty() && !session.profile_id.trim().is_empty() {
        subs.bind(
            "auth_session",
            format!("token:{}:{}", session.access_token, session.profile_id),
        );
    }
    if let Some(res) = options.resolution {
        subs.bind("resolution_width", res.width.to_string())
            .bind("resolution_height", res.height.to_string());
    }

    let mut jvm_args = vec![format!("-Xmx{}M", options.max_memory_mb)];
    jvm_args.extend(subs.apply_all(&descriptor.jvm_argument_template(platform, &features))?);

    let mut game_args = subs.apply_all(&descriptor.game_argument_template(platform, &features))?;

    // Legacy templates have no resolution clause.
    let has_modern_game_args = descriptor
        .arguments
        .as_ref()
        .is_some_and(|a| !a.game.is_empty());
    if let (Some(res), false) = (options.resolution, has_modern_game_args) {
        game_args.extend([
            "--width".to_string(),
            res.width.to_string(),
            "--height".to_string(),
            res.height.to_string(),
        ]);
    }
    if let Some(server) = &options.server {
        game_args.extend([
            "--server".to_string(),
            server.host.clone(),
            "--port".to_string(),
            server.port.to_string(),
        ]);
    }
    if options.fullscreen {
        game_args.push("--fullscreen".to_string());
    }

    Ok(LaunchPlan {
        version_id: descriptor.id.clone(),
        main_class,
        classpath,
        natives_dir,
        jvm_args,
        game_args,
        working_dir: layout.game_dir(),
    })
}
