// ─── Platform Rules ───
// Evaluates `rules` arrays on libraries and argument clauses.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Deserialize;

/// Operating system names as spelled in version descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsName {
    Windows,
    Osx,
    Linux,
}

impl OsName {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsName::Windows => "windows",
            OsName::Osx => "osx",
            OsName::Linux => "linux",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Value substituted for `${arch}` in natives classifiers.
    pub fn bits(&self) -> &'static str {
        match self {
            Arch::X86 => "32",
            Arch::X86_64 | Arch::Arm64 => "64",
        }
    }
}

/// The platform rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: OsName,
    pub arch: Arch,
}

impl Platform {
    pub const fn new(os: OsName, arch: Arch) -> Self {
        Self { os, arch }
    }

    pub fn current() -> Self {
        let os = if cfg!(target_os = "windows") {
            OsName::Windows
        } else if cfg!(target_os = "macos") {
            OsName::Osx
        } else {
            OsName::Linux
        };
        let arch = if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else {
            Arch::X86_64
        };
        Self { os, arch }
    }

    /// Separator between classpath entries on this platform.
    pub fn classpath_separator(&self) -> &'static str {
        match self.os {
            OsName::Windows => ";",
            OsName::Osx | OsName::Linux => ":",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

/// Launcher features that argument clauses can be conditioned on,
/// e.g. `has_custom_resolution`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features {
    enabled: BTreeSet<String>,
}

impl Features {
    pub fn enable(&mut self, name: &str) {
        self.enabled.insert(name.to_string());
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    /// Kernel version pattern. Not evaluated.
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

impl Rule {
    fn applies_to(&self, platform: &Platform, features: &Features) -> bool {
        let os_matches = match &self.os {
            None => true,
            Some(os) => {
                let name_matches = os
                    .name
                    .as_deref()
                    .map_or(true, |name| name == platform.os.as_str());
                let arch_matches = os
                    .arch
                    .as_deref()
                    .map_or(true, |arch| arch == platform.arch.as_str());
                name_matches && arch_matches
            }
        };

        os_matches
            && self
                .features
                .iter()
                .all(|(name, wanted)| features.is_enabled(name) == *wanted)
    }
}

/// Evaluate a rule list.
///
/// - No rules → allowed.
/// - Otherwise start disallowed; every rule that applies sets the state
///   to its action, so the last applicable rule wins.
pub fn rules_allow(rules: Option<&[Rule]>, platform: &Platform, features: &Features) -> bool {
    let Some(rules) = rules else {
        return true;
    };
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;
    for rule in rules {
        if rule.applies_to(platform, features) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}
