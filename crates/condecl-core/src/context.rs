use crate::CoreError;
use condecl_schema::{ChannelPriority, MatchSpec, SatSolverChoice, Subdir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const RC_ENV_VAR: &str = "CONDECL_RC";

/// Ambient settings every manifest is layered over.
///
/// Loaded from a TOML rc file; keys left out of the file take the built-in
/// defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Context {
    pub target_prefix: PathBuf,
    /// Platform packages are solved for.
    pub subdir: Subdir,
    /// Platforms searched for packages. Empty means `[subdir, noarch]`.
    pub subdirs: Vec<Subdir>,
    pub channels: Vec<String>,
    pub channel_priority: ChannelPriority,
    pub sat_solver: SatSolverChoice,
    pub solver: String,
    pub pinned_packages: Vec<MatchSpec>,
    pub aggressive_update_packages: Vec<String>,
    pub repodata_fns: Vec<String>,
    pub use_only_tar_bz2: bool,
    pub quiet: bool,
    pub dry_run: bool,
    /// External program that resolves specs into package records.
    pub solver_command: Option<String>,
    /// External program that installs resolved records into the prefix.
    pub linker_command: Option<String>,
}

fn default_prefix() -> PathBuf {
    std::env::var_os("CONDA_PREFIX").map_or_else(|| PathBuf::from("."), PathBuf::from)
}

impl Default for Context {
    fn default() -> Self {
        Self {
            target_prefix: default_prefix(),
            subdir: Subdir::host(),
            subdirs: Vec::new(),
            channels: vec!["conda-forge".to_owned()],
            channel_priority: ChannelPriority::Flexible,
            sat_solver: SatSolverChoice::Pycosat,
            solver: "libmamba".to_owned(),
            pinned_packages: Vec::new(),
            aggressive_update_packages: vec![
                "ca-certificates".to_owned(),
                "certifi".to_owned(),
                "openssl".to_owned(),
            ],
            repodata_fns: vec!["repodata.json".to_owned()],
            use_only_tar_bz2: false,
            quiet: false,
            dry_run: false,
            solver_command: None,
            linker_command: None,
        }
    }
}

impl Context {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!("no rc file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid rc file {}: {e}", path.display())))
    }

    /// Load from `$CONDECL_RC`, else `~/.config/condecl/condeclrc.toml`.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_rc_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.target_prefix = prefix.into();
        self
    }

    /// Effective search platforms: the configured list, or the active
    /// platform followed by `noarch`.
    pub fn subdirs(&self) -> Vec<Subdir> {
        if !self.subdirs.is_empty() {
            return self.subdirs.clone();
        }
        let mut subdirs = vec![self.subdir.clone()];
        if self.subdir != Subdir::NOARCH {
            subdirs.push(Subdir::new(Subdir::NOARCH));
        }
        subdirs
    }
}

fn default_rc_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(RC_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/condecl/condeclrc.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rc_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(ctx.channels, vec!["conda-forge".to_owned()]);
        assert_eq!(ctx.subdir, Subdir::host());
    }

    #[test]
    fn rc_file_overrides_selected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("condeclrc.toml");
        std::fs::write(
            &path,
            "subdir = \"linux-aarch64\"\nchannel-priority = \"strict\"\npinned-packages = [\"python 3.11.*\"]\n",
        )
        .unwrap();
        let ctx = Context::load(&path).unwrap();
        assert_eq!(ctx.subdir, "linux-aarch64");
        assert_eq!(ctx.channel_priority, ChannelPriority::Strict);
        assert_eq!(ctx.pinned_packages[0].version(), Some("3.11.*"));
        assert_eq!(ctx.solver, "libmamba");
    }

    #[test]
    fn invalid_rc_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("condeclrc.toml");
        std::fs::write(&path, "sat-solver = \"glucose\"\n").unwrap();
        assert!(matches!(Context::load(&path), Err(CoreError::Config(_))));
    }

    #[test]
    fn subdirs_default_to_active_plus_noarch() {
        let ctx = Context {
            subdir: Subdir::new("osx-arm64"),
            ..Context::default()
        };
        assert_eq!(
            ctx.subdirs(),
            vec![Subdir::new("osx-arm64"), Subdir::new("noarch")]
        );
    }
}
