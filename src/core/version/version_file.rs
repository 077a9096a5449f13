// ─── Version Descriptor ───
// Parses a per-version JSON document and answers platform questions about it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;
use crate::core::state::is_contained;

use super::rules::{rules_allow, Features, Platform, Rule};

/// Default repository for libraries that only carry a coordinate.
pub const LIBRARIES_BASE_URL: &str = "https://libraries.minecraft.net/";

/// Highest descriptor format this launcher understands.
pub const SUPPORTED_LAUNCHER_VERSION: u32 = 21;

/// A parsed version descriptor. Inherited descriptors are merged with
/// [`super::merge::merge`] before use.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default, rename = "type")]
    pub version_type: Option<String>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub minimum_launcher_version: Option<u32>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    /// Legacy space separated game arguments.
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub java_version: Option<JavaVersionInfo>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadArtifact>,
}

/// Download coordinates as found in `downloads` blocks.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DownloadArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,
    #[serde(default)]
    pub jvm: Vec<Argument>,
}

/// One element of an argument template.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Argument {
    Plain(String),
    Conditional {
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArgumentValue {
    One(String),
    Many(Vec<String>),
}

// ─── Libraries ───

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    /// Repository base for coordinate-only libraries.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    /// OS name → classifier template, e.g. `natives-windows-${arch}`.
    #[serde(default)]
    pub natives: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<DownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<BTreeMap<String, DownloadArtifact>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A library file resolved to concrete download coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryArtifact {
    pub name: String,
    /// Relative to the libraries directory.
    pub path: PathBuf,
    pub url: String,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

impl Library {
    pub fn is_allowed_on(&self, platform: &Platform) -> bool {
        rules_allow(self.rules.as_deref(), platform, &Features::default())
    }

    pub fn coordinate(&self) -> LauncherResult<MavenArtifact> {
        MavenArtifact::parse(&self.name)
    }

    /// The classpath jar of this library, if it has one.
    ///
    /// Natives-only entries of older descriptors declare `downloads` with
    /// classifiers but no artifact; they contribute nothing to the classpath.
    pub fn artifact(&self) -> LauncherResult<Option<LibraryArtifact>> {
        match &self.downloads {
            Some(downloads) => match &downloads.artifact {
                Some(artifact) => self.from_download(artifact, None).map(Some),
                None => Ok(None),
            },
            None => {
                let coord = self.coordinate()?;
                self.from_coordinate(&coord).map(Some)
            }
        }
    }

    /// Classifier carrying native binaries for `platform`, with `${arch}`
    /// substituted.
    pub fn native_classifier(&self, platform: &Platform) -> Option<String> {
        self.natives
            .as_ref()?
            .get(platform.os.as_str())
            .map(|template| template.replace("${arch}", platform.arch.bits()))
    }

    pub fn native_artifact(&self, platform: &Platform) -> LauncherResult<Option<LibraryArtifact>> {
        let Some(classifier) = self.native_classifier(platform) else {
            return Ok(None);
        };

        let declared = self
            .downloads
            .as_ref()
            .and_then(|d| d.classifiers.as_ref())
            .and_then(|c| c.get(&classifier));

        match declared {
            Some(artifact) => self.from_download(artifact, Some(&classifier)).map(Some),
            None => {
                let coord = self.coordinate()?.with_classifier(&classifier);
                self.from_coordinate(&coord).map(Some)
            }
        }
    }

    pub fn extract_excludes(&self) -> Vec<String> {
        match &self.extract {
            Some(rules) => rules.exclude.clone(),
            None => vec!["META-INF/".to_string()],
        }
    }

    fn from_download(
        &self,
        artifact: &DownloadArtifact,
        classifier: Option<&str>,
    ) -> LauncherResult<LibraryArtifact> {
        let name = match classifier {
            Some(c) => format!("{}:{}", self.name, c),
            None => self.name.clone(),
        };
        let path: PathBuf = match &artifact.path {
            Some(raw) => {
                ensure_contained(&name, Path::new(raw))?;
                raw.split('/').collect()
            }
            None => {
                let coord = self.coordinate()?;
                match classifier {
                    Some(c) => coord.with_classifier(c).local_path(),
                    None => coord.local_path(),
                }
            }
        };
        ensure_contained(&name, &path)?;
        Ok(LibraryArtifact {
            name,
            path,
            url: artifact.url.clone(),
            sha1: artifact.sha1.clone(),
            size: artifact.size,
        })
    }

    fn from_coordinate(&self, coord: &MavenArtifact) -> LauncherResult<LibraryArtifact> {
        let base = self.url.as_deref().unwrap_or(LIBRARIES_BASE_URL);
        let path = coord.local_path();
        ensure_contained(&self.name, &path)?;
        Ok(LibraryArtifact {
            name: coord.to_string(),
            path,
            url: coord.url(base),
            sha1: None,
            size: None,
        })
    }
}

/// Library paths come from remote documents and must stay under
/// `libraries/`.
fn ensure_contained(name: &str, path: &Path) -> LauncherResult<()> {
    if is_contained(path) {
        Ok(())
    } else {
        Err(LauncherError::ManifestMalformed(format!(
            "library {} has unsafe path {:?}",
            name, path
        )))
    }
}

// ─── Descriptor ───

impl VersionDescriptor {
    /// Parse a descriptor document. Any structural problem is reported as
    /// `ManifestMalformed`.
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        serde_json::from_str(raw).map_err(|e| LauncherError::ManifestMalformed(e.to_string()))
    }

    pub fn main_class(&self) -> LauncherResult<&str> {
        self.main_class
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                LauncherError::ManifestMalformed(format!("{} declares no mainClass", self.id))
            })
    }

    /// Libraries whose rules allow `platform`, in declared order.
    pub fn applicable_libraries<'a>(
        &'a self,
        platform: &'a Platform,
    ) -> impl Iterator<Item = &'a Library> + 'a {
        self.libraries
            .iter()
            .filter(move |lib| lib.is_allowed_on(platform))
    }

    pub fn client_download(&self) -> LauncherResult<&DownloadArtifact> {
        self.downloads
            .as_ref()
            .and_then(|d| d.client.as_ref())
            .ok_or_else(|| {
                LauncherError::ManifestMalformed(format!(
                    "{} declares no client download",
                    self.id
                ))
            })
    }

    pub fn asset_index_name(&self) -> &str {
        self.asset_index
            .as_ref()
            .map(|ai| ai.id.as_str())
            .or(self.assets.as_deref())
            .unwrap_or("legacy")
    }

    pub fn required_java_major(&self) -> u32 {
        self.java_version.map(|j| j.major_version).unwrap_or(8)
    }

    pub fn version_type(&self) -> &str {
        self.version_type.as_deref().unwrap_or("release")
    }

    /// Game argument template for `platform`, placeholders untouched.
    pub fn game_argument_template(&self, platform: &Platform, features: &Features) -> Vec<String> {
        match &self.arguments {
            Some(args) if !args.game.is_empty() => evaluate_arguments(&args.game, platform, features),
            _ => self
                .minecraft_arguments
                .as_deref()
                .map(|s| s.split_whitespace().map(ToString::to_string).collect())
                .unwrap_or_default(),
        }
    }

    /// JVM argument template for `platform`. Legacy descriptors carry none,
    /// so the minimal natives + classpath pair is supplied.
    pub fn jvm_argument_template(&self, platform: &Platform, features: &Features) -> Vec<String> {
        match &self.arguments {
            Some(args) if !args.jvm.is_empty() => evaluate_arguments(&args.jvm, platform, features),
            _ => vec![
                "-Djava.library.path=${natives_directory}".to_string(),
                "-cp".to_string(),
                "${classpath}".to_string(),
            ],
        }
    }
}

fn evaluate_arguments(args: &[Argument], platform: &Platform, features: &Features) -> Vec<String> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Argument::Plain(value) => out.push(value.clone()),
            Argument::Conditional { rules, value } => {
                if !rules_allow(Some(rules), platform, features) {
                    continue;
                }
                match value {
                    ArgumentValue::One(v) => out.push(v.clone()),
                    ArgumentValue::Many(vs) => out.extend(vs.iter().cloned()),
                }
            }
        }
    }
    out
}
