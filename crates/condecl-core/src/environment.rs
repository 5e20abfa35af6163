//! The flat environment shape consumed by solvers and installers.

use crate::context::Context;
use condecl_schema::{impl_combine, ChannelPriority, Config, MatchSpec, SatSolverChoice, Subdir};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Solver-facing configuration. `None` means "not specified here".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggressive_update_packages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_priority: Option<ChannelPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_settings: Option<Vec<BTreeMap<String, String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_packages: Option<Vec<MatchSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repodata_fns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat_solver: Option<SatSolverChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_only_tar_bz2: Option<bool>,
}

impl_combine!(EnvironmentConfig {
    aggressive_update_packages,
    channel_priority,
    channels,
    channel_settings,
    pinned_packages,
    repodata_fns,
    sat_solver,
    solver,
    use_only_tar_bz2,
});

impl EnvironmentConfig {
    /// Defaults derived from the ambient context. Every field is set.
    pub fn from_context(ctx: &Context) -> Self {
        Self {
            aggressive_update_packages: Some(ctx.aggressive_update_packages.clone()),
            channel_priority: Some(ctx.channel_priority),
            channels: Some(ctx.channels.clone()),
            channel_settings: Some(Vec::new()),
            pinned_packages: Some(ctx.pinned_packages.clone()),
            repodata_fns: Some(ctx.repodata_fns.clone()),
            sat_solver: Some(ctx.sat_solver),
            solver: Some(ctx.solver.clone()),
            use_only_tar_bz2: Some(ctx.use_only_tar_bz2),
        }
    }
}

impl From<&Config> for EnvironmentConfig {
    fn from(config: &Config) -> Self {
        Self {
            aggressive_update_packages: config.aggressive_update_packages.clone(),
            channel_priority: config.channel_priority,
            channels: config.channels.clone(),
            channel_settings: config.channel_settings.clone(),
            pinned_packages: config
                .pinned_packages
                .as_ref()
                .map(|pins| pins.specs().cloned().collect()),
            repodata_fns: config.repodata_fns.clone(),
            sat_solver: config.sat_solver,
            solver: config.solver.clone(),
            use_only_tar_bz2: config.use_only_tar_bz2,
        }
    }
}

/// A fully resolved environment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub prefix: PathBuf,
    pub platform: Subdir,
    #[serde(default)]
    pub config: EnvironmentConfig,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub requested_packages: Vec<MatchSpec>,
    /// Installer name to package list, e.g. `{"pip": ["requests>=2"]}`.
    #[serde(default)]
    pub external_packages: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Environment {
    pub fn pip_packages(&self) -> &[String] {
        self.external_packages
            .get("pip")
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use condecl_schema::Combine;

    #[test]
    fn manifest_config_wins_over_context() {
        let ctx = Context::default();
        let manifest: Config =
            toml::from_str("channels = [\"bioconda\", \"conda-forge\"]\nsat-solver = \"pysat\"").unwrap();
        let merged = EnvironmentConfig::from_context(&ctx).combine(EnvironmentConfig::from(&manifest));
        assert_eq!(
            merged.channels,
            Some(vec!["bioconda".to_owned(), "conda-forge".to_owned()])
        );
        assert_eq!(merged.sat_solver, Some(SatSolverChoice::Pysat));
        assert_eq!(merged.solver.as_deref(), Some("libmamba"));
    }

    #[test]
    fn environment_json_shape() {
        let env = Environment {
            prefix: PathBuf::from("/opt/envs/web"),
            platform: Subdir::new("linux-64"),
            config: EnvironmentConfig::default(),
            name: Some("web".to_owned()),
            requested_packages: vec!["python>=3.11".parse().unwrap()],
            external_packages: BTreeMap::from([("pip".to_owned(), vec!["rich".to_owned()])]),
            variables: BTreeMap::new(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["requested_packages"][0], "python>=3.11");
        assert_eq!(json["external_packages"]["pip"][0], "rich");
        let back: Environment = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.pip_packages(), ["rich".to_owned()]);
    }
}
