//! Semantic validation and layout dispatch for manifest documents.
//!
//! Serde handles shape (unknown keys, types, enum values). The checks here
//! cover what the type system cannot: non-empty strings, known platforms,
//! and the cross-references between groups and environments.

use crate::config::{Config, SystemRequirements};
use crate::manifest::{
    About, Group, ManifestError, PlatformOverrides, TomlEnvironment, TomlMultiEnvironment,
    TomlSingleEnvironment,
};
use crate::types::Subdir;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Non-fatal findings from validating a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestWarning {
    /// Groups defined but referenced by no environment.
    UnusedGroups(BTreeSet<String>),
}

impl std::fmt::Display for ManifestWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestWarning::UnusedGroups(groups) => {
                let names: Vec<&str> = groups.iter().map(String::as_str).collect();
                write!(
                    f,
                    "groups not used by any environment: {}",
                    names.join(", ")
                )
            }
        }
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ManifestError> {
    if value.trim().is_empty() {
        Err(ManifestError::EmptyValue(field.to_owned()))
    } else {
        Ok(())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

impl About {
    pub fn validate(&self) -> Result<(), ManifestError> {
        non_empty("about.revision", &self.revision)?;
        if let Some(description) = &self.description {
            non_empty("about.description", description)?;
        }
        if let Some(license) = &self.license {
            non_empty("about.license", license)?;
        }
        for file in &self.license_files {
            non_empty("about.license-files", file)?;
        }
        for author in &self.authors {
            non_empty("about.authors.name", &author.name)?;
            if let Some(email) = &author.email {
                if !looks_like_email(email) {
                    return Err(ManifestError::InvalidEmail {
                        name: author.name.clone(),
                        email: email.clone(),
                    });
                }
            }
        }
        for (label, url) in &self.urls {
            non_empty("about.urls key", label)?;
            non_empty(&format!("about.urls.{label}"), url)?;
        }
        Ok(())
    }
}

fn validate_optional(
    config: Option<&Config>,
    system_requirements: Option<&SystemRequirements>,
) -> Result<(), ManifestError> {
    if let Some(config) = config {
        config.validate()?;
    }
    if let Some(reqs) = system_requirements {
        reqs.validate()?;
    }
    Ok(())
}

fn validate_platforms(platforms: &BTreeMap<Subdir, PlatformOverrides>) -> Result<(), ManifestError> {
    for (subdir, overrides) in platforms {
        if !subdir.is_known() {
            return Err(ManifestError::UnknownPlatform(subdir.to_string()));
        }
        overrides.validate()?;
    }
    Ok(())
}

impl PlatformOverrides {
    pub fn validate(&self) -> Result<(), ManifestError> {
        validate_optional(self.config.as_ref(), self.system_requirements.as_ref())
    }
}

impl Group {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if let Some(description) = &self.description {
            non_empty("group description", description)?;
        }
        validate_optional(self.config.as_ref(), self.system_requirements.as_ref())?;
        validate_platforms(&self.platform)
    }
}

impl TomlSingleEnvironment {
    /// Validate field contents. An empty dependency set is accepted here;
    /// only layout dispatch insists on one.
    pub fn validate(&self) -> Result<(), ManifestError> {
        non_empty("$schema", &self.schema)?;
        self.about.validate()?;
        validate_optional(self.config.as_ref(), self.system_requirements.as_ref())?;
        validate_platforms(&self.platform)
    }
}

impl TomlMultiEnvironment {
    pub fn validate(&self) -> Result<(), ManifestError> {
        non_empty("$schema", &self.schema)?;
        self.about.validate()?;
        validate_optional(self.config.as_ref(), self.system_requirements.as_ref())?;
        if self.groups.is_empty() {
            return Err(ManifestError::NoGroups);
        }
        for group in self.groups.values() {
            group.validate()?;
        }
        if self.environments.is_empty() {
            return Err(ManifestError::NoEnvironments);
        }

        let mut missing: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (env, groups) in &self.environments {
            for group in groups {
                if !self.groups.contains_key(group) {
                    missing
                        .entry(env.clone())
                        .or_default()
                        .insert(group.to_string());
                }
            }
        }
        if !missing.is_empty() {
            return Err(ManifestError::UndefinedGroups(missing));
        }

        for warning in self.warnings() {
            warn!("{warning}");
        }
        Ok(())
    }

    /// Groups no environment refers to.
    pub fn unused_groups(&self) -> BTreeSet<String> {
        let used: BTreeSet<&str> = self
            .environments
            .values()
            .flatten()
            .map(|g| g.as_str())
            .collect();
        self.groups
            .keys()
            .filter(|g| !used.contains(g.as_str()))
            .map(ToString::to_string)
            .collect()
    }

    pub fn warnings(&self) -> Vec<ManifestWarning> {
        let unused = self.unused_groups();
        if unused.is_empty() {
            Vec::new()
        } else {
            vec![ManifestWarning::UnusedGroups(unused)]
        }
    }
}

fn single_from_table(table: toml::Table) -> Result<TomlSingleEnvironment, ManifestError> {
    let doc: TomlSingleEnvironment = toml::Value::Table(table).try_into()?;
    doc.validate()?;
    if doc.dependencies.is_empty() && doc.pypi_dependencies.is_empty() {
        return Err(ManifestError::NoDependencies);
    }
    Ok(doc)
}

fn multi_from_table(table: toml::Table) -> Result<TomlMultiEnvironment, ManifestError> {
    let doc: TomlMultiEnvironment = toml::Value::Table(table).try_into()?;
    doc.validate()?;
    Ok(doc)
}

impl TomlEnvironment {
    /// Validate a raw document, trying the single-environment layout first and
    /// the multi-environment layout second.
    pub fn from_table(table: toml::Table) -> Result<Self, ManifestError> {
        let single = match single_from_table(table.clone()) {
            Ok(doc) => return Ok(TomlEnvironment::Single(doc)),
            Err(e) => e,
        };
        debug!("not a single-environment manifest: {single}");
        match multi_from_table(table) {
            Ok(doc) => Ok(TomlEnvironment::Multi(doc)),
            Err(multi) => Err(ManifestError::NoMatchingVariant {
                single: Box::new(single),
                multi: Box::new(multi),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        match self {
            TomlEnvironment::Single(doc) => doc.validate(),
            TomlEnvironment::Multi(doc) => doc.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::manifest::{parse_manifest_str, ManifestError, TomlEnvironment, TomlSingleEnvironment};

    const MULTI: &str = r#"
[about]
name = "ml"
revision = "1"

[groups.base.dependencies]
python = "3.12.*"
numpy = "*"

[groups.test]
description = "Test tooling"
dependencies = { pytest = "*" }

[groups.gpu.dependencies]
pytorch = "*"

[environments]
default = ["base"]
ci = ["base", "test"]
"#;

    #[test]
    fn multi_manifest_is_detected() {
        match parse_manifest_str(MULTI).unwrap() {
            TomlEnvironment::Multi(doc) => {
                assert_eq!(doc.groups.len(), 3);
                assert_eq!(doc.environments["ci"].len(), 2);
                let unused = doc.unused_groups();
                assert_eq!(unused.into_iter().collect::<Vec<_>>(), vec!["gpu".to_owned()]);
            }
            TomlEnvironment::Single(_) => panic!("expected a multi-environment manifest"),
        }
    }

    #[test]
    fn undefined_groups_are_all_reported() {
        let input = r#"
[about]
name = "x"
revision = "1"
[groups.base.dependencies]
python = "*"
[environments]
a = ["base", "missing-one"]
b = ["missing-two"]
"#;
        let err = parse_manifest_str(input).unwrap_err();
        let ManifestError::NoMatchingVariant { multi, .. } = err else {
            panic!("expected an aggregated error");
        };
        match *multi {
            ManifestError::UndefinedGroups(missing) => {
                assert_eq!(missing.len(), 2);
                assert!(missing["a"].contains("missing-one"));
                assert!(missing["b"].contains("missing-two"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn multi_requires_groups_and_environments() {
        let no_envs = "[about]\nname = \"x\"\nrevision = \"1\"\n[groups.base.dependencies]\npython = \"*\"\n";
        let err = parse_manifest_str(no_envs).unwrap_err().to_string();
        assert!(err.contains("at least one environment"), "{err}");

        let nothing = "[about]\nname = \"x\"\nrevision = \"1\"\n";
        let err = parse_manifest_str(nothing).unwrap_err().to_string();
        assert!(err.contains("at least one dependency"), "{err}");
        assert!(err.contains("at least one group"), "{err}");
    }

    #[test]
    fn empty_single_is_accepted_when_layout_is_known() {
        let doc = TomlSingleEnvironment::from_toml_str("[about]\nname = \"\"\nrevision = \"1\"\n").unwrap();
        assert!(doc.dependencies.is_empty());
    }

    #[test]
    fn invalid_email_is_rejected() {
        let input = r#"
[about]
name = "x"
revision = "1"
authors = [{ name = "Ada", email = "not-an-email" }]
[dependencies]
python = "*"
"#;
        let err = parse_manifest_str(input).unwrap_err().to_string();
        assert!(err.contains("not-an-email"), "{err}");
    }

    #[test]
    fn empty_revision_is_rejected() {
        let input = "[about]\nname = \"x\"\nrevision = \"\"\n[dependencies]\npython = \"*\"\n";
        let err = parse_manifest_str(input).unwrap_err().to_string();
        assert!(err.contains("about.revision"), "{err}");
    }

    #[test]
    fn unknown_platform_key_is_rejected() {
        let input = "[about]\nname = \"x\"\nrevision = \"1\"\n[dependencies]\npython = \"*\"\n[platform.beos-64.dependencies]\nfoo = \"*\"\n";
        let err = parse_manifest_str(input).unwrap_err().to_string();
        assert!(err.contains("beos-64"), "{err}");
    }
}
