//! PyPI dependencies and their rendering as pip requirement strings.

use crate::dependency::DependencyError;
use serde::ser::SerializeMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

const VERSION_OPERATORS: [char; 5] = ['<', '>', '=', '!', '~'];

/// A single PyPI requirement. `path` marks a local (optionally editable) package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PypiDependency {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<String>,
    pub editable: Option<bool>,
}

impl PypiDependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            path: None,
            editable: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>, editable: bool) -> Self {
        self.path = Some(path.into());
        self.editable = Some(editable);
        self
    }

    pub fn is_editable(&self) -> bool {
        self.editable.unwrap_or(false)
    }

    /// Render as a pip requirement.
    ///
    /// Editable and path packages become their bare path. A missing or `*`
    /// version yields the bare name, a version starting with a digit is pinned
    /// with `==`, and one starting with a comparison operator is appended
    /// verbatim. Anything else cannot be expressed without guessing.
    pub fn to_pip(&self) -> Result<String, DependencyError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let version = match self.version.as_deref().map(str::trim) {
            None | Some("" | "*") => return Ok(self.name.clone()),
            Some(v) => v,
        };
        if version.starts_with(|c: char| c.is_ascii_digit()) {
            Ok(format!("{}=={version}", self.name))
        } else if version.starts_with(VERSION_OPERATORS) {
            Ok(format!("{}{version}", self.name))
        } else {
            Err(DependencyError::AmbiguousPip {
                name: self.name.clone(),
                version: version.to_owned(),
            })
        }
    }

    /// Parse a pip requirement string such as `requests>=2`, `six==1.16.0`
    /// or `-e ./local`.
    pub fn from_pip(requirement: &str) -> Result<Self, DependencyError> {
        let requirement = requirement.trim();
        if let Some(path) = requirement.strip_prefix("-e ") {
            let path = path.trim();
            let name = path
                .trim_end_matches(['/', '\\'])
                .rsplit(['/', '\\'])
                .next()
                .filter(|n| !n.is_empty() && *n != ".")
                .unwrap_or(path);
            return Ok(Self::new(name).with_path(path, true));
        }
        let (name, version) = match requirement.find(VERSION_OPERATORS) {
            Some(idx) => (requirement[..idx].trim(), Some(requirement[idx..].trim())),
            None => (requirement, None),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(DependencyError::InvalidPypi {
                name: requirement.to_owned(),
                reason: "expected a package name optionally followed by a version".to_owned(),
            });
        }
        let mut dep = Self::new(name);
        if let Some(version) = version {
            let version = version.strip_prefix("==").unwrap_or(version);
            dep = dep.with_version(version);
        }
        Ok(dep)
    }

    fn from_toml(name: &str, value: toml::Value) -> Result<Self, DependencyError> {
        let invalid = |reason: String| DependencyError::InvalidPypi {
            name: name.to_owned(),
            reason,
        };
        match value {
            toml::Value::String(version) => Ok(Self::new(name).with_version(version)),
            toml::Value::Table(table) => {
                if let Some(key) = table.keys().find(|k| !matches!(k.as_str(), "path" | "editable")) {
                    return Err(invalid(format!("unexpected key '{key}'")));
                }
                let path = match table.get("path") {
                    Some(toml::Value::String(p)) => p.clone(),
                    Some(_) => return Err(invalid("'path' must be a string".to_owned())),
                    None => return Err(invalid("table form requires 'path'".to_owned())),
                };
                let editable = match table.get("editable") {
                    None => None,
                    Some(toml::Value::Boolean(b)) => Some(*b),
                    Some(_) => return Err(invalid("'editable' must be a boolean".to_owned())),
                };
                Ok(Self {
                    name: name.to_owned(),
                    version: None,
                    path: Some(path),
                    editable,
                })
            }
            other => Err(DependencyError::UnsupportedValue {
                name: name.to_owned(),
                value: other.to_string(),
            }),
        }
    }
}

/// PyPI dependencies keyed by name, kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PypiDependencies(Vec<PypiDependency>);

impl PypiDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later entries replace earlier ones with the same name.
    pub fn from_list(list: Vec<PypiDependency>) -> Self {
        let keyed: BTreeMap<String, PypiDependency> =
            list.into_iter().map(|d| (d.name.clone(), d)).collect();
        Self(keyed.into_values().collect())
    }

    pub fn from_toml_table(table: toml::Table) -> Result<Self, DependencyError> {
        let list = table
            .into_iter()
            .map(|(name, value)| PypiDependency::from_toml(&name, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_list(list))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PypiDependency> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PypiDependency> {
        self.0
            .binary_search_by(|d| d.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.0[idx])
    }

    pub fn insert(&mut self, dep: PypiDependency) {
        match self.0.binary_search_by(|d| d.name.cmp(&dep.name)) {
            Ok(idx) => self.0[idx] = dep,
            Err(idx) => self.0.insert(idx, dep),
        }
    }

    pub fn merge(&mut self, other: &PypiDependencies) {
        for dep in other.iter() {
            self.insert(dep.clone());
        }
    }
}

impl<'a> IntoIterator for &'a PypiDependencies {
    type Item = &'a PypiDependency;
    type IntoIter = std::slice::Iter<'a, PypiDependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum PypiEntry<'a> {
    Version(&'a str),
    Path {
        path: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        editable: Option<bool>,
    },
}

impl Serialize for PypiDependencies {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for dep in &self.0 {
            let entry = match &dep.path {
                Some(path) => PypiEntry::Path {
                    path,
                    editable: dep.editable,
                },
                None => PypiEntry::Version(dep.version.as_deref().unwrap_or("*")),
            };
            map.serialize_entry(&dep.name, &entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PypiDependencies {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let table = toml::Table::deserialize(deserializer)?;
        PypiDependencies::from_toml_table(table).map_err(de::Error::custom)
    }
}
