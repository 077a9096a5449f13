pub mod manifest;
pub mod merge;
pub mod resolver;
pub mod rules;
pub mod version_file;

pub use manifest::{LatestVersions, VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
pub use merge::merge;
pub use resolver::VersionResolver;
pub use rules::{rules_allow, Arch, Features, OsName, Platform, Rule, RuleAction};
pub use version_file::{
    Argument, Library, LibraryArtifact, VersionDescriptor, LIBRARIES_BASE_URL,
    SUPPORTED_LAUNCHER_VERSION,
};
