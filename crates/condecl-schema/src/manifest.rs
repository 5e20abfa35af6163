//! Manifest documents in their two layouts.
//!
//! A single-environment manifest ([`TomlSingleEnvironment`]) lists its
//! dependencies at the top level. A multi-environment manifest
//! ([`TomlMultiEnvironment`]) declares named `[groups]` and an
//! `[environments]` table that composes them. [`TomlEnvironment`] holds
//! either one; [`parse_manifest_str`] and [`parse_manifest_file`] pick the
//! layout and validate the result.

use crate::config::{Config, SystemRequirements};
use crate::dependency::{Dependencies, DependencyError};
use crate::pypi::PypiDependencies;
use crate::types::{GroupName, Subdir};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SCHEMA_URL: &str = "https://schemas.conda.org/conda/v0/conda-manifest.schema.json";
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
    #[error("{0} must not be empty")]
    EmptyValue(String),
    #[error("invalid email address for author '{name}': '{email}'")]
    InvalidEmail { name: String, email: String },
    #[error("pinned package '{0}' must not be an editable package")]
    EditablePin(String),
    #[error("a single-environment manifest must declare at least one dependency or pypi-dependency")]
    NoDependencies,
    #[error("at least one group is required in a multi-environment manifest")]
    NoGroups,
    #[error("a multi-environment manifest must contain at least one environment")]
    NoEnvironments,
    #[error("environments reference undefined groups: {}", describe_undefined(.0))]
    UndefinedGroups(BTreeMap<String, BTreeSet<String>>),
    #[error("environment '{name}' is not defined (available: {})", .available.join(", "))]
    UnknownEnvironment { name: String, available: Vec<String> },
    #[error("manifest matches neither layout\n  as a single environment: {single}\n  as a multi-environment: {multi}")]
    NoMatchingVariant {
        single: Box<ManifestError>,
        multi: Box<ManifestError>,
    },
}

fn describe_undefined(missing: &BTreeMap<String, BTreeSet<String>>) -> String {
    missing
        .iter()
        .map(|(env, groups)| {
            let groups: Vec<&str> = groups.iter().map(String::as_str).collect();
            format!("{env} -> [{}]", groups.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn default_schema() -> String {
    DEFAULT_SCHEMA_URL.to_owned()
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Descriptive metadata in the `[about]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct About {
    pub name: String,
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(
        default,
        rename = "license-files",
        alias = "license_files",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub license_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub urls: BTreeMap<String, String>,
}

impl About {
    /// Metadata for a manifest bootstrapped from an existing environment.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: "1".to_owned(),
            ..Self::default()
        }
    }
}

/// Settings that apply only when a given platform is the active target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
    #[serde(
        default,
        rename = "system-requirements",
        alias = "system_requirements",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_requirements: Option<SystemRequirements>,
    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub dependencies: Dependencies,
    #[serde(
        default,
        rename = "pypi-dependencies",
        alias = "pypi_dependencies",
        skip_serializing_if = "PypiDependencies::is_empty"
    )]
    pub pypi_dependencies: PypiDependencies,
}

impl PlatformOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A manifest describing exactly one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlSingleEnvironment {
    #[serde(rename = "$schema", default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub about: About,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
    #[serde(
        default,
        rename = "system-requirements",
        alias = "system_requirements",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_requirements: Option<SystemRequirements>,
    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub dependencies: Dependencies,
    #[serde(
        default,
        rename = "pypi-dependencies",
        alias = "pypi_dependencies",
        skip_serializing_if = "PypiDependencies::is_empty"
    )]
    pub pypi_dependencies: PypiDependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform: BTreeMap<Subdir, PlatformOverrides>,
}

impl TomlSingleEnvironment {
    pub fn new(about: About) -> Self {
        Self {
            schema: default_schema(),
            version: CURRENT_VERSION,
            about,
            config: None,
            system_requirements: None,
            dependencies: Dependencies::new(),
            pypi_dependencies: PypiDependencies::new(),
            platform: BTreeMap::new(),
        }
    }

    /// Parse a document known to be a single environment.
    ///
    /// Unlike [`parse_manifest_str`] this accepts a manifest with no
    /// dependencies at all, which is what an emptied environment looks like.
    pub fn from_toml_str(input: &str) -> Result<Self, ManifestError> {
        let doc: Self = toml::from_str(input)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_toml_string(&self) -> Result<String, ManifestError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// A reusable bundle of dependencies and settings in a multi-environment manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
    #[serde(
        default,
        rename = "system-requirements",
        alias = "system_requirements",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_requirements: Option<SystemRequirements>,
    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub dependencies: Dependencies,
    #[serde(
        default,
        rename = "pypi-dependencies",
        alias = "pypi_dependencies",
        skip_serializing_if = "PypiDependencies::is_empty"
    )]
    pub pypi_dependencies: PypiDependencies,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform: BTreeMap<Subdir, PlatformOverrides>,
}

/// A manifest of named groups composed into named environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlMultiEnvironment {
    #[serde(rename = "$schema", default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub about: About,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
    #[serde(
        default,
        rename = "system-requirements",
        alias = "system_requirements",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_requirements: Option<SystemRequirements>,
    #[serde(default)]
    pub groups: BTreeMap<GroupName, Group>,
    #[serde(default)]
    pub environments: BTreeMap<String, Vec<GroupName>>,
}

impl TomlMultiEnvironment {
    pub fn to_toml_string(&self) -> Result<String, ManifestError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Either manifest layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TomlEnvironment {
    Single(TomlSingleEnvironment),
    Multi(TomlMultiEnvironment),
}

impl TomlEnvironment {
    pub fn about(&self) -> &About {
        match self {
            TomlEnvironment::Single(doc) => &doc.about,
            TomlEnvironment::Multi(doc) => &doc.about,
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ManifestError> {
        match self {
            TomlEnvironment::Single(doc) => doc.to_toml_string(),
            TomlEnvironment::Multi(doc) => doc.to_toml_string(),
        }
    }
}

impl From<TomlSingleEnvironment> for TomlEnvironment {
    fn from(doc: TomlSingleEnvironment) -> Self {
        TomlEnvironment::Single(doc)
    }
}

impl From<TomlMultiEnvironment> for TomlEnvironment {
    fn from(doc: TomlMultiEnvironment) -> Self {
        TomlEnvironment::Multi(doc)
    }
}

impl Serialize for TomlEnvironment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TomlEnvironment::Single(doc) => doc.serialize(serializer),
            TomlEnvironment::Multi(doc) => doc.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TomlEnvironment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let table = toml::Table::deserialize(deserializer)?;
        TomlEnvironment::from_table(table).map_err(de::Error::custom)
    }
}

/// Parse and validate a manifest of either layout.
pub fn parse_manifest_str(input: &str) -> Result<TomlEnvironment, ManifestError> {
    let table: toml::Table = toml::from_str(input)?;
    TomlEnvironment::from_table(table)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<TomlEnvironment, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::Dependency;

    const SINGLE: &str = r#"
[about]
name = "web"
revision = "3"
description = "A small web service"
license = "BSD-3-Clause"
license-files = ["LICENSE"]

[[about.authors]]
name = "Ada"
email = "ada@example.org"

[about.urls]
home = "https://example.org"

[config]
channels = ["conda-forge"]
channel-priority = "strict"

[config.variables]
FLASK_ENV = "development"

[system-requirements]
libc = "2.28"

[dependencies]
python = ">=3.11"
flask = "*"
local = { path = "./pkg", editable = true }

[pypi-dependencies]
requests = ">=2"

[platform.linux-64.dependencies]
gunicorn = "*"
"#;

    #[test]
    fn parses_full_single_manifest() {
        let doc = match parse_manifest_str(SINGLE).unwrap() {
            TomlEnvironment::Single(doc) => doc,
            TomlEnvironment::Multi(_) => panic!("expected a single environment"),
        };
        assert_eq!(doc.schema, DEFAULT_SCHEMA_URL);
        assert_eq!(doc.version, CURRENT_VERSION);
        assert_eq!(doc.about.name, "web");
        assert_eq!(doc.about.license_files, vec!["LICENSE".to_owned()]);
        assert_eq!(doc.about.authors[0].email.as_deref(), Some("ada@example.org"));
        assert_eq!(doc.dependencies.len(), 3);
        assert!(matches!(doc.dependencies.get("local"), Some(Dependency::Editable(_))));
        assert_eq!(doc.pypi_dependencies.len(), 1);
        let linux = &doc.platform[&Subdir::new("linux-64")];
        assert!(linux.dependencies.contains("gunicorn"));
        let config = doc.config.as_ref().unwrap();
        assert_eq!(config.variables.as_ref().unwrap()["FLASK_ENV"], "development");
    }

    #[test]
    fn serialization_round_trips() {
        let doc = parse_manifest_str(SINGLE).unwrap();
        let text = doc.to_toml_string().unwrap();
        assert!(text.contains("license-files"));
        assert!(text.contains("pypi-dependencies"));
        assert!(!text.contains("license_files"));
        let again = parse_manifest_str(&text).unwrap();
        assert_eq!(again, doc);
        assert_eq!(again.to_toml_string().unwrap(), text);
    }

    #[test]
    fn groups_and_environments_select_multi_layout() {
        let input = r#"
[about]
name = "stack"
revision = "1"

[groups.base.dependencies]
python = "*"

[environments]
default = ["base"]
"#;
        match parse_manifest_str(input).unwrap() {
            TomlEnvironment::Multi(doc) => {
                assert_eq!(doc.about.name, "stack");
                assert_eq!(doc.environment_names(), vec!["default".to_owned()]);
            }
            TomlEnvironment::Single(_) => panic!("expected a multi environment"),
        }
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let input = "[about]\nname = \"x\"\nrevision = \"1\"\n[dependencies]\npython = \"*\"\n[extras]\na = 1\n";
        assert!(parse_manifest_str(input).is_err());
    }

    #[test]
    fn underscored_keys_are_accepted() {
        let input = "[about]\nname = \"x\"\nrevision = \"1\"\nlicense_files = [\"COPYING\"]\n[pypi_dependencies]\nrich = \"*\"\n";
        let doc = parse_manifest_str(input).unwrap();
        let text = doc.to_toml_string().unwrap();
        assert!(text.contains("license-files"));
        assert!(text.contains("[pypi-dependencies]"));
    }

    #[test]
    fn negative_version_is_rejected() {
        let input = "version = -1\n[about]\nname = \"x\"\nrevision = \"1\"\n[dependencies]\npython = \"*\"\n";
        assert!(parse_manifest_str(input).is_err());
    }

    #[test]
    fn reads_manifest_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conda.toml");
        fs::write(&path, SINGLE).unwrap();
        let doc = parse_manifest_file(&path).unwrap();
        assert_eq!(doc.about().name, "web");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_manifest_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::Io(_)));
    }
}
