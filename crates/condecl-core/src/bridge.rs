//! Conversion between manifests and the flat [`Environment`] shape.
//!
//! Manifest → environment takes `prefix` and `platform` from the context and
//! layers the manifest's config over context defaults. Environment →
//! manifest is lossy: descriptions, system requirements, authors, license
//! and urls have no counterpart in an environment and come back as defaults.

use crate::context::Context;
use crate::environment::{Environment, EnvironmentConfig};
use crate::CoreError;
use condecl_schema::{
    About, Combine, Config, Dependencies, Dependency, PlatformOverrides, PypiDependencies,
    PypiDependency, TomlEnvironment, TomlMultiEnvironment, TomlSingleEnvironment,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment composed from a multi-environment manifest when none is named.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Everything a [`TomlSpec`] can be built from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    /// Path to a `.toml` manifest on disk.
    Path(PathBuf),
    /// An unvalidated manifest document.
    Table(toml::Table),
    /// An already validated manifest.
    Model(TomlEnvironment),
    /// An environment to convert into a manifest.
    Environment(Environment),
}

impl From<PathBuf> for ManifestSource {
    fn from(path: PathBuf) -> Self {
        ManifestSource::Path(path)
    }
}

impl From<&Path> for ManifestSource {
    fn from(path: &Path) -> Self {
        ManifestSource::Path(path.to_path_buf())
    }
}

impl From<toml::Table> for ManifestSource {
    fn from(table: toml::Table) -> Self {
        ManifestSource::Table(table)
    }
}

impl From<TomlEnvironment> for ManifestSource {
    fn from(doc: TomlEnvironment) -> Self {
        ManifestSource::Model(doc)
    }
}

impl From<TomlSingleEnvironment> for ManifestSource {
    fn from(doc: TomlSingleEnvironment) -> Self {
        ManifestSource::Model(TomlEnvironment::Single(doc))
    }
}

impl From<TomlMultiEnvironment> for ManifestSource {
    fn from(doc: TomlMultiEnvironment) -> Self {
        ManifestSource::Model(TomlEnvironment::Multi(doc))
    }
}

impl From<Environment> for ManifestSource {
    fn from(env: Environment) -> Self {
        ManifestSource::Environment(env)
    }
}

impl TryFrom<serde_json::Value> for ManifestSource {
    type Error = CoreError;

    /// A JSON string is taken as a path and a JSON object as a manifest table.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(path) => Ok(ManifestSource::Path(PathBuf::from(path))),
            serde_json::Value::Object(_) => {
                let table: toml::Table = serde_json::from_value(value).map_err(|e| {
                    CoreError::InvalidInput(format!("object is not representable as TOML: {e}"))
                })?;
                Ok(ManifestSource::Table(table))
            }
            other => Err(CoreError::InvalidInput(format!(
                "expected a manifest path or table, found {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A manifest paired with the context it will be resolved against.
#[derive(Debug, Clone)]
pub struct TomlSpec {
    source: ManifestSource,
    context: Context,
    environment_name: Option<String>,
}

impl TomlSpec {
    pub fn new(source: impl Into<ManifestSource>, context: Context) -> Self {
        Self {
            source: source.into(),
            context,
            environment_name: None,
        }
    }

    /// Select which environment of a multi-environment manifest to use.
    #[must_use]
    pub fn with_environment_name(mut self, name: impl Into<String>) -> Self {
        self.environment_name = Some(name.into());
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Whether the source can be loaded, without surfacing why not.
    pub fn can_handle(&self) -> bool {
        match self.model() {
            Ok(_) => true,
            Err(e) => {
                debug!("cannot handle manifest source: {e}");
                false
            }
        }
    }

    /// The single-environment manifest for this source.
    ///
    /// Multi-environment manifests are composed into the selected environment.
    pub fn model(&self) -> Result<TomlSingleEnvironment, CoreError> {
        match &self.source {
            ManifestSource::Path(path) => self.model_from_table(read_table(path)?),
            ManifestSource::Table(table) => self.model_from_table(table.clone()),
            ManifestSource::Model(doc) => self.select(doc.clone()),
            ManifestSource::Environment(env) => environment_to_model(env),
        }
    }

    /// The environment to hand to a solver, resolved for `context.subdir`.
    pub fn environment(&self) -> Result<Environment, CoreError> {
        if let ManifestSource::Environment(env) = &self.source {
            return Ok(env.clone());
        }
        model_to_environment(&self.model()?, &self.context)
    }

    /// `CONDA_OVERRIDE_*` values implied by `[system-requirements]` for
    /// `context.subdir`. These belong in the solver's process environment,
    /// never in the manifest's own variables.
    pub fn virtual_package_overrides(&self) -> Result<BTreeMap<String, String>, CoreError> {
        if let ManifestSource::Environment(_) = &self.source {
            return Ok(BTreeMap::new());
        }
        let resolved = self.model()?.for_platform(&self.context.subdir);
        Ok(resolved
            .system_requirements
            .map(|reqs| reqs.overrides())
            .unwrap_or_default())
    }

    fn select(&self, doc: TomlEnvironment) -> Result<TomlSingleEnvironment, CoreError> {
        match doc {
            TomlEnvironment::Single(doc) => Ok(doc),
            TomlEnvironment::Multi(doc) => {
                let name = self.environment_name.as_deref().unwrap_or(DEFAULT_ENVIRONMENT);
                Ok(doc.compose(name)?)
            }
        }
    }

    fn model_from_table(&self, table: toml::Table) -> Result<TomlSingleEnvironment, CoreError> {
        let misrouted = table.contains_key("prefix");
        match TomlEnvironment::from_table(table) {
            Ok(doc) => self.select(doc),
            Err(_) if misrouted => Err(CoreError::MisroutedEnvironment),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_table(path: &Path) -> Result<toml::Table, CoreError> {
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if !is_toml || !path.is_file() {
        return Err(CoreError::InvalidInput(format!(
            "no TOML manifest at {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| CoreError::Manifest(e.into()))
}

/// Resolve a manifest against the context into a solver-ready environment.
pub fn model_to_environment(
    model: &TomlSingleEnvironment,
    ctx: &Context,
) -> Result<Environment, CoreError> {
    let model = model.for_platform(&ctx.subdir);
    let manifest_config = model.config.clone().unwrap_or_default();
    let config =
        EnvironmentConfig::from_context(ctx).combine(EnvironmentConfig::from(&manifest_config));

    let mut requested_packages = Vec::with_capacity(model.dependencies.len());
    for dep in &model.dependencies {
        match dep {
            Dependency::Spec(spec) => requested_packages.push(spec.clone()),
            Dependency::Editable(pkg) => {
                warn!(
                    "conda package '{}' at {} is editable and is not passed to the solver",
                    pkg.name, pkg.path
                );
            }
        }
    }

    let mut pip = Vec::with_capacity(model.pypi_dependencies.len());
    for dep in &model.pypi_dependencies {
        if dep.is_editable() {
            warn!("dropping editable PyPI package '{}' from the pip install list", dep.name);
            continue;
        }
        pip.push(dep.to_pip()?);
    }

    let variables = manifest_config.variables.unwrap_or_default();

    let name = Some(model.about.name.clone()).filter(|n| !n.is_empty());
    Ok(Environment {
        prefix: ctx.target_prefix.clone(),
        platform: ctx.subdir.clone(),
        config,
        name,
        requested_packages,
        external_packages: BTreeMap::from([("pip".to_owned(), pip)]),
        variables,
    })
}

/// Build a manifest from an environment. Lossy: see the module docs.
pub fn environment_to_model(env: &Environment) -> Result<TomlSingleEnvironment, CoreError> {
    let mut doc = TomlSingleEnvironment::new(About::placeholder(
        env.name.clone().unwrap_or_default(),
    ));
    let config = Config {
        channels: env.config.channels.clone(),
        variables: Some(env.variables.clone()).filter(|v| !v.is_empty()),
        ..Config::default()
    };
    doc.config = Some(config).filter(|c| !c.is_empty());
    doc.platform
        .insert(env.platform.clone(), PlatformOverrides::default());
    doc.dependencies = Dependencies::from_specs(env.requested_packages.iter().cloned());
    let pip = env
        .pip_packages()
        .iter()
        .map(|req| PypiDependency::from_pip(req))
        .collect::<Result<Vec<_>, _>>()?;
    doc.pypi_dependencies = PypiDependencies::from_list(pip);
    Ok(doc)
}
