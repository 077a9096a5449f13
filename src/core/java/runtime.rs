use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

/// Where the runtime executable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSource {
    Settings,
    JavaHome,
    /// Bare `java`, left to the OS search path.
    SystemPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JavaRuntime {
    pub path: PathBuf,
    pub source: RuntimeSource,
}

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Pick the runtime: the configured executable if it exists, then
/// `$JAVA_HOME`, then whatever `java` the OS finds.
pub fn find_java_binary(configured: Option<&Path>) -> JavaRuntime {
    let java_home = std::env::var_os("JAVA_HOME").map(PathBuf::from);
    select_runtime(configured, java_home.as_deref())
}

fn select_runtime(configured: Option<&Path>, java_home: Option<&Path>) -> JavaRuntime {
    if let Some(path) = configured {
        if path.is_file() {
            debug!("Using configured runtime {:?}", path);
            return JavaRuntime {
                path: path.to_path_buf(),
                source: RuntimeSource::Settings,
            };
        }
        warn!("Configured runtime {:?} does not exist, ignoring", path);
    }

    if let Some(home) = java_home {
        if let Some(path) = locate_java_binary(home) {
            debug!("Using runtime from JAVA_HOME {:?}", path);
            return JavaRuntime {
                path,
                source: RuntimeSource::JavaHome,
            };
        }
    }

    JavaRuntime {
        path: PathBuf::from(java_exe()),
        source: RuntimeSource::SystemPath,
    }
}

/// `bin/java` under a runtime root, also in the macOS bundle layout.
fn locate_java_binary(runtime_root: &Path) -> Option<PathBuf> {
    let primary = runtime_root.join("bin").join(java_exe());
    if primary.is_file() {
        return Some(primary);
    }

    let mac_layout = runtime_root
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_exe());
    mac_layout.is_file().then_some(mac_layout)
}
