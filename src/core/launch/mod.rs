pub mod arguments;
pub mod classpath;
pub mod plan;
pub mod task;

pub use arguments::Substitutions;
pub use classpath::{build_classpath, extract_natives, join_classpath};
pub use plan::{build, LaunchOptions, LaunchPlan};
pub use task::{CommandSpawner, ProcessSpawner, SpawnRequest, SpawnedProcess};
