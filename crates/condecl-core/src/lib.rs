//! Reconciliation engine for condecl-managed conda environments.
//!
//! This crate connects the manifest model from `condecl-schema` to a live
//! environment prefix: the ambient `Context`, the `TomlSpec` bridge between a
//! manifest and the flat `Environment` shape a solver consumes, the install
//! `History` reader, the `update_state` reconciler that keeps the manifest in
//! step with user actions, and the `apply` pipeline that solves and links.

pub mod apply;
pub mod bridge;
pub mod context;
pub mod environment;
pub mod history;
pub mod state;

pub use apply::{
    apply, lock, solve, ApplyOptions, ApplyOutcome, Linker, NullReporter, PackageRecord,
    Reporter, Solver,
};
pub use bridge::{ManifestSource, TomlSpec};
pub use context::Context;
pub use environment::{Environment, EnvironmentConfig};
pub use history::{History, HistorySource};
pub use state::{
    init_manifest, manifest_path, read_manifest, update_state, StateUpdate, MANIFEST_FILE,
};

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] condecl_schema::ManifestError),
    #[error("dependency error: {0}")]
    Dependency(#[from] condecl_schema::DependencyError),
    #[error("invalid match spec: {0}")]
    Spec(#[from] condecl_schema::SpecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error(
        "the input looks like an exported environment (it has a 'prefix' key), not a manifest; \
         use `import` to convert it"
    )]
    MisroutedEnvironment,
    #[error("cannot handle input: {0}")]
    InvalidInput(String),
    #[error("manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),
    #[error("manifest {} was modified by another process while it was being updated", .0.display())]
    ConcurrentModification(PathBuf),
    #[error("solve failed: {0}")]
    Solve(String),
    #[error("link failed: {0}")]
    Link(String),
    #[error("history error: {0}")]
    History(String),
}

pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Replace `dest` with `content` in one rename, creating parent directories.
pub(crate) fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), CoreError> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| CoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}
