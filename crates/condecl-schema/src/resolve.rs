//! Flattening documents into a single effective environment.

use crate::combine::Combine;
use crate::manifest::{ManifestError, PlatformOverrides, TomlMultiEnvironment, TomlSingleEnvironment};
use crate::types::Subdir;
use std::collections::BTreeMap;
use tracing::debug;

/// Field-wise merge of two optional blocks; `None` on either side is transparent.
fn layer<T: Combine>(base: Option<T>, over: Option<T>) -> Option<T> {
    match (base, over) {
        (Some(base), Some(over)) => Some(base.combine(over)),
        (base, over) => over.or(base),
    }
}

fn apply_overrides(doc: &mut TomlSingleEnvironment, overrides: &PlatformOverrides) {
    doc.config = layer(doc.config.take(), overrides.config.clone());
    doc.system_requirements = layer(
        doc.system_requirements.take(),
        overrides.system_requirements.clone(),
    );
    doc.dependencies.merge(&overrides.dependencies);
    doc.pypi_dependencies.merge(&overrides.pypi_dependencies);
}

fn merge_platforms(
    into: &mut BTreeMap<Subdir, PlatformOverrides>,
    from: &BTreeMap<Subdir, PlatformOverrides>,
) {
    for (subdir, over) in from {
        let entry = into.entry(subdir.clone()).or_default();
        entry.config = layer(entry.config.take(), over.config.clone());
        entry.system_requirements = layer(
            entry.system_requirements.take(),
            over.system_requirements.clone(),
        );
        entry.dependencies.merge(&over.dependencies);
        entry.pypi_dependencies.merge(&over.pypi_dependencies);
    }
}

impl TomlSingleEnvironment {
    /// The document as seen on `platform`: its `[platform.<id>]` block is
    /// folded into the top level and all platform blocks are dropped.
    #[must_use]
    pub fn for_platform(&self, platform: &Subdir) -> TomlSingleEnvironment {
        let mut doc = self.clone();
        let platforms = std::mem::take(&mut doc.platform);
        if let Some(overrides) = platforms.get(platform) {
            debug!("applying platform overrides for {platform}");
            apply_overrides(&mut doc, overrides);
        }
        doc
    }
}

impl TomlMultiEnvironment {
    /// Names of the declared environments, sorted.
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    /// Build the single-environment view of `env_name` by layering its groups
    /// in order over the top-level settings.
    pub fn compose(&self, env_name: &str) -> Result<TomlSingleEnvironment, ManifestError> {
        let groups = self
            .environments
            .get(env_name)
            .ok_or_else(|| ManifestError::UnknownEnvironment {
                name: env_name.to_owned(),
                available: self.environment_names(),
            })?;

        let mut doc = TomlSingleEnvironment::new(self.about.clone());
        doc.schema.clone_from(&self.schema);
        doc.version = self.version;
        doc.config.clone_from(&self.config);
        doc.system_requirements.clone_from(&self.system_requirements);

        for name in groups {
            let Some(group) = self.groups.get(name) else {
                let mut missing = BTreeMap::new();
                missing.insert(env_name.to_owned(), [name.to_string()].into());
                return Err(ManifestError::UndefinedGroups(missing));
            };
            doc.config = layer(doc.config.take(), group.config.clone());
            doc.system_requirements = layer(
                doc.system_requirements.take(),
                group.system_requirements.clone(),
            );
            doc.dependencies.merge(&group.dependencies);
            doc.pypi_dependencies.merge(&group.pypi_dependencies);
            merge_platforms(&mut doc.platform, &group.platform);
        }
        debug!(
            "composed environment '{env_name}' from {} group(s): {} conda, {} pypi dependencies",
            groups.len(),
            doc.dependencies.len(),
            doc.pypi_dependencies.len()
        );
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ChannelPriority;
    use crate::manifest::{parse_manifest_str, ManifestError, TomlEnvironment};
    use crate::types::Subdir;

    const MULTI: &str = r#"
[about]
name = "ml"
revision = "1"

[config]
channels = ["conda-forge"]

[groups.base]
config = { channel-priority = "strict" }
dependencies = { python = "3.11.*", numpy = "*" }

[groups.base.platform.osx-arm64.dependencies]
libcxx = "*"

[groups.modern.dependencies]
python = "3.12.*"

[groups.test.dependencies]
pytest = "*"

[environments]
default = ["base"]
dev = ["base", "modern", "test"]
"#;

    fn multi() -> crate::manifest::TomlMultiEnvironment {
        match parse_manifest_str(MULTI).unwrap() {
            TomlEnvironment::Multi(doc) => doc,
            TomlEnvironment::Single(_) => panic!("expected a multi-environment manifest"),
        }
    }

    #[test]
    fn later_groups_override_earlier_ones() {
        let dev = multi().compose("dev").unwrap();
        let python = dev.dependencies.get("python").unwrap().as_spec().unwrap();
        assert_eq!(python.version(), Some("3.12.*"));
        assert!(dev.dependencies.contains("pytest"));
        assert!(dev.dependencies.contains("numpy"));
        let config = dev.config.unwrap();
        assert_eq!(config.channels, Some(vec!["conda-forge".to_owned()]));
        assert_eq!(config.channel_priority, Some(ChannelPriority::Strict));
    }

    #[test]
    fn composed_platform_blocks_carry_over() {
        let default = multi().compose("default").unwrap();
        assert!(!default.dependencies.contains("pytest"));
        let mac = default.for_platform(&Subdir::new("osx-arm64"));
        assert!(mac.dependencies.contains("libcxx"));
        assert!(mac.platform.is_empty());
        let linux = default.for_platform(&Subdir::new("linux-64"));
        assert!(!linux.dependencies.contains("libcxx"));
    }

    #[test]
    fn unknown_environment_lists_available() {
        let err = multi().compose("prod").unwrap_err();
        assert!(matches!(err, ManifestError::UnknownEnvironment { .. }));
        let text = err.to_string();
        assert!(text.contains("prod") && text.contains("default, dev"), "{text}");
    }

    #[test]
    fn platform_block_overrides_top_level() {
        let input = r#"
[about]
name = "x"
revision = "1"
[config]
channels = ["defaults"]
solver = "libmamba"
[dependencies]
python = "3.11"
[platform.win-64]
config = { channels = ["conda-forge"] }
dependencies = { python = "3.10", pywin32 = "*" }
"#;
        let TomlEnvironment::Single(doc) = parse_manifest_str(input).unwrap() else {
            panic!("expected a single environment");
        };
        let win = doc.for_platform(&Subdir::new("win-64"));
        let python = win.dependencies.get("python").unwrap().as_spec().unwrap();
        assert_eq!(python.version(), Some("3.10"));
        assert!(win.dependencies.contains("pywin32"));
        let config = win.config.unwrap();
        assert_eq!(config.channels, Some(vec!["conda-forge".to_owned()]));
        assert_eq!(config.solver.as_deref(), Some("libmamba"));
    }
}
