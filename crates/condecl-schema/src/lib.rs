//! Declarative conda manifest model for condecl.
//!
//! This crate defines the schema layer: match specs (`MatchSpec`), dependency
//! normalization (`Dependencies`, `PypiDependencies`), the `[config]` block and
//! its right-biased merge (`Combine`), and the two manifest layouts
//! (`TomlSingleEnvironment`, `TomlMultiEnvironment`) with validation,
//! platform resolution, and multi-environment composition.

pub mod combine;
pub mod config;
pub mod dependency;
pub mod manifest;
pub mod pypi;
pub mod resolve;
pub mod spec;
pub mod types;
pub mod validate;

pub use combine::{combine, Combine};
pub use config::{ChannelPriority, Config, SatSolverChoice, SystemRequirements};
pub use dependency::{
    normalize, Dependencies, Dependency, DependencyError, DependencyValue, EditablePackage,
};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, About, Author, Group, ManifestError,
    PlatformOverrides, TomlEnvironment, TomlMultiEnvironment, TomlSingleEnvironment,
    CURRENT_VERSION, DEFAULT_SCHEMA_URL,
};
pub use pypi::{PypiDependencies, PypiDependency};
pub use spec::{parse_specs, MatchSpec, SpecError};
pub use types::{GroupName, Subdir, KNOWN_SUBDIRS};
pub use validate::ManifestWarning;
