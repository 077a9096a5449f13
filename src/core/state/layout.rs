use std::path::{Component, Path, PathBuf};

const APP_DIR_NAME: &str = "CraftenLauncher";

/// Every on-disk location the launcher uses, derived from one data directory.
///
/// ```text
/// <root>/
///   versions/<id>/<id>.json      cached descriptor
///   versions/<id>/<id>.jar       client jar
///   versions/<id>/natives/       extracted native libraries
///   libraries/<maven path>
///   assets/indexes/<name>.json
///   assets/objects/<aa>/<hash>
///   launcher_profiles.json
///   launcher_settings.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<platform data dir>/CraftenLauncher`, or the current directory when
    /// the platform reports none.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory of the game process.
    pub fn game_dir(&self) -> PathBuf {
        self.root.clone()
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    pub fn descriptor_path(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.json", id))
    }

    pub fn client_jar_path(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.jar", id))
    }

    pub fn natives_dir(&self, id: &str) -> PathBuf {
        self.version_dir(id).join("natives")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_index_path(&self, name: &str) -> PathBuf {
        self.assets_dir()
            .join("indexes")
            .join(format!("{}.json", name))
    }

    pub fn asset_object_path(&self, hash: &str) -> PathBuf {
        let prefix = hash.get(..2).unwrap_or(hash);
        self.assets_dir().join("objects").join(prefix).join(hash)
    }

    /// Flat copy of resources used by pre-1.7 versions.
    pub fn legacy_assets_dir(&self) -> PathBuf {
        self.assets_dir().join("virtual").join("legacy")
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.root.join("launcher_profiles.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("launcher_settings.json")
    }
}

/// True when `relative` names something below the directory it is joined
/// onto: no `..`, no root, no drive prefix.
pub fn is_contained(relative: &Path) -> bool {
    let mut components = relative.components().peekable();
    if components.peek().is_none() {
        return false;
    }
    components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
