// ─── Craften Core ───
// Backend of the launcher: everything between "play version X" and a
// running game process.
//
// Architecture:
//   core/
//     version/     manifest, descriptors, OS rules, parent merge, resolver
//     maven/       coordinate parsing and repository paths
//     assets/      asset index + resource tasks
//     downloader/  verified fetches on a bounded worker pool
//     events       progress and lifecycle observers
//     auth/        sessions, session file, identity service
//     java/        runtime executable lookup
//     launch/      classpath, natives, arguments, process spawn
//     state/       settings, cache layout, launcher context
//     launcher     resolve → session → download → plan → spawn

pub mod assets;
pub mod auth;
pub mod downloader;
pub mod error;
pub mod events;
pub mod http;
pub mod java;
pub mod launch;
pub mod launcher;
pub mod maven;
pub mod state;
pub mod version;
