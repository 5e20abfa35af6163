//! The `[config]` block: solver and channel settings plus system requirements.
//!
//! Every field is optional. An unset field means "defer to the ambient
//! context", which is what lets [`crate::combine`] layer manifests over
//! defaults without hardcoding any of them here.

use crate::dependency::{Dependencies, Dependency};
use crate::impl_combine;
use crate::manifest::ManifestError;
use crate::types::Subdir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How strictly channel order constrains the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPriority {
    Strict,
    Flexible,
    Disabled,
}

impl fmt::Display for ChannelPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelPriority::Strict => "strict",
            ChannelPriority::Flexible => "flexible",
            ChannelPriority::Disabled => "disabled",
        })
    }
}

/// SAT backend used by the classic solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SatSolverChoice {
    Pycosat,
    Pycryptosat,
    Pysat,
}

impl fmt::Display for SatSolverChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SatSolverChoice::Pycosat => "pycosat",
            SatSolverChoice::Pycryptosat => "pycryptosat",
            SatSolverChoice::Pysat => "pysat",
        })
    }
}

/// Conda settings carried by a manifest.
///
/// Unknown keys are ignored rather than rejected so that manifests written for
/// newer conda settings still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(
        rename = "aggressive-update-packages",
        alias = "aggressive_update_packages",
        skip_serializing_if = "Option::is_none"
    )]
    pub aggressive_update_packages: Option<Vec<String>>,
    #[serde(
        rename = "channel-priority",
        alias = "channel_priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel_priority: Option<ChannelPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<Subdir>>,
    #[serde(
        rename = "repodata-fns",
        alias = "repodata_fns",
        skip_serializing_if = "Option::is_none"
    )]
    pub repodata_fns: Option<Vec<String>>,
    #[serde(
        rename = "sat-solver",
        alias = "sat_solver",
        skip_serializing_if = "Option::is_none"
    )]
    pub sat_solver: Option<SatSolverChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    #[serde(
        rename = "use-only-tar-bz2",
        alias = "use_only_tar_bz2",
        skip_serializing_if = "Option::is_none"
    )]
    pub use_only_tar_bz2: Option<bool>,
    #[serde(
        rename = "channel-settings",
        alias = "channel_settings",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel_settings: Option<Vec<BTreeMap<String, String>>>,
    #[serde(
        rename = "pinned-packages",
        alias = "pinned_packages",
        skip_serializing_if = "Option::is_none"
    )]
    pub pinned_packages: Option<Dependencies>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, String>>,
}

impl_combine!(Config {
    aggressive_update_packages,
    channel_priority,
    channels,
    platforms,
    repodata_fns,
    sat_solver,
    solver,
    use_only_tar_bz2,
    channel_settings,
    pinned_packages,
    variables,
});

impl Config {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if let Some(platforms) = &self.platforms {
            if let Some(bad) = platforms.iter().find(|p| !p.is_known()) {
                return Err(ManifestError::UnknownPlatform(bad.to_string()));
            }
        }
        for (field, values) in [
            ("config.channels", &self.channels),
            ("config.aggressive-update-packages", &self.aggressive_update_packages),
            ("config.repodata-fns", &self.repodata_fns),
        ] {
            if values.iter().flatten().any(|v| v.trim().is_empty()) {
                return Err(ManifestError::EmptyValue(field.to_owned()));
            }
        }
        if self.solver.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ManifestError::EmptyValue("config.solver".to_owned()));
        }
        if let Some(pinned) = &self.pinned_packages {
            if let Some(Dependency::Editable(pkg)) =
                pinned.iter().find(|d| matches!(d, Dependency::Editable(_)))
            {
                return Err(ManifestError::EditablePin(pkg.name.clone()));
            }
        }
        Ok(())
    }
}

/// Virtual-package requirements the target system must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuda: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archspec: Option<String>,
}

impl_combine!(SystemRequirements {
    libc,
    cuda,
    osx,
    linux,
    win,
    archspec,
});

impl SystemRequirements {
    fn fields(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("LIBC", self.libc.as_deref()),
            ("CUDA", self.cuda.as_deref()),
            ("OSX", self.osx.as_deref()),
            ("LINUX", self.linux.as_deref()),
            ("WIN", self.win.as_deref()),
            ("ARCHSPEC", self.archspec.as_deref()),
        ]
    }

    /// `CONDA_OVERRIDE_*` variables that make the solver assume these
    /// virtual packages are present.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        self.fields()
            .into_iter()
            .filter_map(|(key, value)| {
                value.map(|v| (format!("CONDA_OVERRIDE_{key}"), v.to_owned()))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        for (key, value) in self.fields() {
            if value.is_some_and(|v| v.trim().is_empty()) {
                return Err(ManifestError::EmptyValue(format!(
                    "system-requirements.{}",
                    key.to_lowercase()
                )));
            }
        }
        Ok(())
    }
}
