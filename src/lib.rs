pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::launcher::{LaunchOrchestrator, LaunchOutcome};
pub use crate::core::state::LauncherContext;

/// Install the structured log subscriber. `RUST_LOG` overrides the default
/// filter; a second call is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,craften_core=debug")),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Craften launcher core {}", env!("CARGO_PKG_VERSION"));
    }
}
