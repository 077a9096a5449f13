pub mod checksum;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod task;

pub use fetcher::{FetchOutcome, Fetcher};
pub use orchestrator::{DownloadOrchestrator, DownloadReport};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use retry::RetryPolicy;
pub use task::{DownloadTask, TaskKind, TaskStatus};
