pub mod app_state;
pub mod layout;
pub mod settings;

pub use app_state::LauncherContext;
pub use layout::{is_contained, CacheLayout};
pub use settings::{LauncherSettings, Resolution, ServerAddress, DEFAULT_SERVER_PORT};
