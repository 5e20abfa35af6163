//! Normalization of conda dependency tables.
//!
//! On disk a dependency value is either a version string, a structured
//! constraint table (`version`/`build`/`channel`/`subdir`) or an editable
//! package table (`path`/`editable`). Every form funnels through
//! [`normalize`] into a name-sorted [`Dependencies`] set so that serializing an
//! unchanged set is byte-stable.

use crate::spec::{MatchSpec, SpecError};
use serde::ser::SerializeMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("unsupported value for dependency '{name}': {value} (expected a version string or a table)")]
    UnsupportedValue { name: String, value: String },
    #[error("invalid constraint table for dependency '{name}': {reason}")]
    InvalidConstraint { name: String, reason: String },
    #[error("invalid match spec for dependency '{name}': {source}")]
    Spec {
        name: String,
        #[source]
        source: SpecError,
    },
    #[error("invalid PyPI dependency '{name}': {reason}")]
    InvalidPypi { name: String, reason: String },
    #[error("cannot convert PyPI dependency '{name}' with version '{version}' to pip format")]
    AmbiguousPip { name: String, version: String },
}

/// A dependency satisfied by a local path instead of a resolved archive.
///
/// Identity is the package name alone: two editable packages with the same
/// name compare equal whatever their paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditablePackage {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub editable: bool,
}

impl PartialEq for EditablePackage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EditablePackage {}

impl PartialOrd for EditablePackage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EditablePackage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// One normalized conda dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    Spec(MatchSpec),
    Editable(EditablePackage),
}

impl Dependency {
    pub fn name(&self) -> &str {
        match self {
            Dependency::Spec(spec) => spec.name(),
            Dependency::Editable(pkg) => &pkg.name,
        }
    }

    pub fn as_spec(&self) -> Option<&MatchSpec> {
        match self {
            Dependency::Spec(spec) => Some(spec),
            Dependency::Editable(_) => None,
        }
    }
}

impl From<MatchSpec> for Dependency {
    fn from(spec: MatchSpec) -> Self {
        Dependency::Spec(spec)
    }
}

impl From<EditablePackage> for Dependency {
    fn from(pkg: EditablePackage) -> Self {
        Dependency::Editable(pkg)
    }
}

/// A raw dependency value as it appears in a manifest mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyValue {
    /// An already-typed constraint, appended as-is.
    Spec(MatchSpec),
    /// A version expression such as `">=3.10"`, `"1.2.*"` or `"*"`.
    Version(String),
    /// A structured editable-package or constraint table.
    Table(toml::Table),
}

impl DependencyValue {
    /// Classify a TOML value, rejecting anything that is neither a string nor a table.
    pub fn from_toml(name: &str, value: toml::Value) -> Result<Self, DependencyError> {
        match value {
            toml::Value::String(s) => Ok(DependencyValue::Version(s)),
            toml::Value::Table(t) => Ok(DependencyValue::Table(t)),
            other => Err(DependencyError::UnsupportedValue {
                name: name.to_owned(),
                value: other.to_string(),
            }),
        }
    }

    fn into_dependency(self, name: &str) -> Result<Dependency, DependencyError> {
        match self {
            DependencyValue::Spec(spec) => Ok(Dependency::Spec(spec)),
            DependencyValue::Version(version) => spec_from_version(name, &version),
            DependencyValue::Table(table) => match editable_from_table(name, &table) {
                Ok(pkg) => Ok(Dependency::Editable(pkg)),
                Err(_) => constraint_from_table(name, &table).map(Dependency::Spec),
            },
        }
    }
}

impl From<MatchSpec> for DependencyValue {
    fn from(spec: MatchSpec) -> Self {
        DependencyValue::Spec(spec)
    }
}

impl From<&str> for DependencyValue {
    fn from(version: &str) -> Self {
        DependencyValue::Version(version.to_owned())
    }
}

impl From<String> for DependencyValue {
    fn from(version: String) -> Self {
        DependencyValue::Version(version)
    }
}

impl From<toml::Table> for DependencyValue {
    fn from(table: toml::Table) -> Self {
        DependencyValue::Table(table)
    }
}

fn spec_from_version(name: &str, version: &str) -> Result<Dependency, DependencyError> {
    let version = version.trim();
    let raw = if version.starts_with(['<', '>', '=', '!', '~']) {
        format!("{name}{version}")
    } else {
        format!("{name} {version}")
    };
    raw.parse()
        .map(Dependency::Spec)
        .map_err(|source| DependencyError::Spec {
            name: name.to_owned(),
            source,
        })
}

fn table_str<'a>(name: &str, table: &'a toml::Table, key: &str) -> Result<Option<&'a str>, DependencyError> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(DependencyError::InvalidConstraint {
            name: name.to_owned(),
            reason: format!("'{key}' must be a string, found {}", other.type_str()),
        }),
    }
}

fn editable_from_table(name: &str, table: &toml::Table) -> Result<EditablePackage, DependencyError> {
    let invalid = |reason: String| DependencyError::InvalidConstraint {
        name: name.to_owned(),
        reason,
    };
    if let Some(key) = table.keys().find(|k| !matches!(k.as_str(), "path" | "editable")) {
        return Err(invalid(format!("unexpected key '{key}' for an editable package")));
    }
    let path = table_str(name, table, "path")?
        .ok_or_else(|| invalid("editable package requires 'path'".to_owned()))?;
    let editable = match table.get("editable") {
        None => false,
        Some(toml::Value::Boolean(b)) => *b,
        Some(other) => {
            return Err(invalid(format!(
                "'editable' must be a boolean, found {}",
                other.type_str()
            )))
        }
    };
    Ok(EditablePackage {
        name: name.to_owned(),
        path: path.to_owned(),
        editable,
    })
}

fn constraint_from_table(name: &str, table: &toml::Table) -> Result<MatchSpec, DependencyError> {
    if let Some(key) = table
        .keys()
        .find(|k| !matches!(k.as_str(), "version" | "build" | "channel" | "subdir"))
    {
        return Err(DependencyError::InvalidConstraint {
            name: name.to_owned(),
            reason: format!("unexpected key '{key}' (expected version, build, channel or subdir, or path/editable)"),
        });
    }
    let mut spec: MatchSpec = name.parse().map_err(|source| DependencyError::Spec {
        name: name.to_owned(),
        source,
    })?;
    if let Some(version) = table_str(name, table, "version")? {
        spec = spec.with_version(version);
    }
    if let Some(build) = table_str(name, table, "build")? {
        spec = spec.with_build(build);
    }
    if let Some(channel) = table_str(name, table, "channel")? {
        spec = spec.with_channel(channel);
    }
    if let Some(subdir) = table_str(name, table, "subdir")? {
        spec = spec.with_subdir(subdir);
    }
    Ok(spec)
}

/// Normalize a name → value mapping into a name-sorted dependency set.
///
/// Fails on the first entry whose value cannot be interpreted, naming it.
pub fn normalize<I, K>(entries: I) -> Result<Dependencies, DependencyError>
where
    I: IntoIterator<Item = (K, DependencyValue)>,
    K: AsRef<str>,
{
    let deps = entries
        .into_iter()
        .map(|(name, value)| value.into_dependency(name.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Dependencies::from_list(deps))
}

/// A set of conda dependencies keyed by package name, kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies(Vec<Dependency>);

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an already-normalized list. Later entries win over earlier ones
    /// with the same name.
    pub fn from_list(list: Vec<Dependency>) -> Self {
        let keyed: BTreeMap<String, Dependency> = list
            .into_iter()
            .map(|dep| (dep.name().to_owned(), dep))
            .collect();
        Self(keyed.into_values().collect())
    }

    pub fn from_specs(specs: impl IntoIterator<Item = MatchSpec>) -> Self {
        Self::from_list(specs.into_iter().map(Dependency::Spec).collect())
    }

    pub fn from_toml_table(table: toml::Table) -> Result<Self, DependencyError> {
        let entries = table
            .into_iter()
            .map(|(name, value)| {
                let value = DependencyValue::from_toml(&name, value)?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, DependencyError>>()?;
        normalize(entries)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dependency> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Dependency> {
        self.position(name).ok().map(|idx| &self.0[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    /// Insert or replace the entry with the same name, returning the old one.
    pub fn insert(&mut self, dep: impl Into<Dependency>) -> Option<Dependency> {
        let dep = dep.into();
        match self.position(dep.name()) {
            Ok(idx) => Some(std::mem::replace(&mut self.0[idx], dep)),
            Err(idx) => {
                self.0.insert(idx, dep);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Dependency> {
        self.position(name).ok().map(|idx| self.0.remove(idx))
    }

    /// Overlay `other` onto this set; entries in `other` replace same-named ones.
    pub fn merge(&mut self, other: &Dependencies) {
        for dep in other.iter() {
            self.insert(dep.clone());
        }
    }

    /// The plain constraints, skipping editable packages.
    pub fn specs(&self) -> impl Iterator<Item = &MatchSpec> {
        self.0.iter().filter_map(Dependency::as_spec)
    }

    pub fn editables(&self) -> impl Iterator<Item = &EditablePackage> {
        self.0.iter().filter_map(|dep| match dep {
            Dependency::Editable(pkg) => Some(pkg),
            Dependency::Spec(_) => None,
        })
    }

    pub fn into_vec(self) -> Vec<Dependency> {
        self.0
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.0.binary_search_by(|dep| dep.name().cmp(name))
    }
}

impl<'a> IntoIterator for &'a Dependencies {
    type Item = &'a Dependency;
    type IntoIter = std::slice::Iter<'a, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum DependencyEntry<'a> {
    Version(String),
    Constraint {
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        build: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subdir: Option<&'a str>,
    },
    Editable {
        path: &'a str,
        editable: bool,
    },
}

/// The plain `name = "version"` form of `spec`, if reading it back yields
/// the same spec.
fn plain_version(spec: &MatchSpec) -> Option<String> {
    if !spec.is_version_only() {
        return None;
    }
    let version = spec.version().unwrap_or("*");
    match spec_from_version(spec.name(), version) {
        Ok(Dependency::Spec(back)) if back == *spec => Some(version.to_owned()),
        _ => None,
    }
}

impl<'a> From<&'a Dependency> for DependencyEntry<'a> {
    fn from(dep: &'a Dependency) -> Self {
        match dep {
            Dependency::Spec(spec) => match plain_version(spec) {
                Some(version) => DependencyEntry::Version(version),
                None => DependencyEntry::Constraint {
                    version: spec.version(),
                    build: spec.build(),
                    channel: spec.channel(),
                    subdir: spec.subdir().map(|s| s.as_str()),
                },
            },
            Dependency::Editable(pkg) => DependencyEntry::Editable {
                path: &pkg.path,
                editable: pkg.editable,
            },
        }
    }
}

impl Serialize for Dependencies {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for dep in &self.0 {
            map.serialize_entry(dep.name(), &DependencyEntry::from(dep))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dependencies {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let table = toml::Table::deserialize(deserializer)?;
        Dependencies::from_toml_table(table).map_err(de::Error::custom)
    }
}
