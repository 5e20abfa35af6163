//! The manifest persisted inside an environment prefix, and the reconciler
//! that keeps it in step with install, update and remove requests.

use crate::history::HistorySource;
use crate::{write_atomic, CoreError};
use condecl_schema::{
    parse_manifest_str, About, Dependencies, ManifestError, MatchSpec, TomlEnvironment,
    TomlSingleEnvironment,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest location relative to the environment prefix.
pub const MANIFEST_FILE: &str = "conda-meta/conda.toml";

pub fn manifest_path(prefix: &Path) -> PathBuf {
    prefix.join(MANIFEST_FILE)
}

/// Parse manifest text of either layout.
///
/// A single-environment document with no dependencies is accepted here
/// because the reconciler produces one when every package is removed.
pub fn parse_state_text(text: &str) -> Result<TomlEnvironment, ManifestError> {
    match parse_manifest_str(text) {
        Ok(doc) => Ok(doc),
        Err(union_err) => TomlSingleEnvironment::from_toml_str(text)
            .map(TomlEnvironment::Single)
            .map_err(|_| union_err),
    }
}

/// Read the manifest stored in `prefix`.
pub fn read_manifest(prefix: &Path) -> Result<TomlEnvironment, CoreError> {
    let path = manifest_path(prefix);
    if !path.is_file() {
        return Err(CoreError::ManifestNotFound(path));
    }
    let text = fs::read_to_string(&path)?;
    Ok(parse_state_text(&text)?)
}

/// Read the manifest stored in `prefix`, which must be a single environment.
pub fn from_env_file(prefix: &Path) -> Result<TomlSingleEnvironment, CoreError> {
    match read_manifest(prefix)? {
        TomlEnvironment::Single(doc) => Ok(doc),
        TomlEnvironment::Multi(_) => Err(CoreError::InvalidInput(format!(
            "{} is a multi-environment manifest and cannot be updated in place",
            manifest_path(prefix).display()
        ))),
    }
}

pub fn to_env_file(prefix: &Path, doc: &TomlSingleEnvironment) -> Result<(), CoreError> {
    let text = doc.to_toml_string()?;
    write_atomic(&manifest_path(prefix), text.as_bytes())
}

fn fingerprint(path: &Path) -> Result<Option<blake3::Hash>, CoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(blake3::hash(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn prefix_name(prefix: &Path) -> String {
    prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn manifest_from_history(
    about: About,
    history: &dyn HistorySource,
) -> Result<TomlSingleEnvironment, CoreError> {
    let mut doc = TomlSingleEnvironment::new(about);
    doc.dependencies = Dependencies::from_specs(history.requested_specs_map()?.into_values());
    Ok(doc)
}

/// Apply requested removals and updates to the manifest in `prefix`.
///
/// The baseline is the existing manifest, or the install history when the
/// prefix has none. Removals are applied before updates, so a package named
/// in both ends up with its updated constraint. Removing a package the
/// baseline does not list is a no-op. Metadata, config and platform blocks
/// of an existing manifest are kept, including its `[about]` revision and
/// description. Only a manifest seeded from history gets the fresh
/// placeholder `[about]` block.
///
/// Fails with [`CoreError::ConcurrentModification`] if the manifest changed
/// on disk between reading the baseline and writing the result.
pub fn update_state(
    prefix: &Path,
    remove_specs: &[MatchSpec],
    update_specs: &[MatchSpec],
    history: &dyn HistorySource,
) -> Result<TomlSingleEnvironment, CoreError> {
    let path = manifest_path(prefix);
    let before = fingerprint(&path)?;

    let mut doc = if before.is_some() {
        from_env_file(prefix)?
    } else {
        debug!("no manifest at {}; seeding from install history", path.display());
        manifest_from_history(About::placeholder(""), history)?
    };

    for spec in remove_specs {
        if doc.dependencies.remove(spec.name()).is_some() {
            debug!("removed {} from manifest", spec.name());
        }
    }
    for spec in update_specs {
        doc.dependencies.insert(spec.clone());
    }

    let text = doc.to_toml_string()?;
    if fingerprint(&path)? != before {
        return Err(CoreError::ConcurrentModification(path));
    }
    write_atomic(&path, text.as_bytes())?;
    info!(
        "updated {} ({} dependencies)",
        path.display(),
        doc.dependencies.len()
    );
    Ok(doc)
}

/// Create the manifest from install history if `prefix` has none.
///
/// Returns the text before and after; both are the existing text when a
/// manifest was already present, and the old text is empty otherwise.
pub fn init_manifest(
    prefix: &Path,
    history: &dyn HistorySource,
) -> Result<(String, String), CoreError> {
    let path = manifest_path(prefix);
    if path.is_file() {
        let text = fs::read_to_string(&path)?;
        return Ok((text.clone(), text));
    }
    let doc = manifest_from_history(About::placeholder(prefix_name(prefix)), history)?;
    let text = doc.to_toml_string()?;
    write_atomic(&path, text.as_bytes())?;
    info!("created {}", path.display());
    Ok((String::new(), text))
}

/// A reversible manifest update run after a package transaction.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub target_prefix: PathBuf,
    pub remove_specs: Vec<MatchSpec>,
    pub update_specs: Vec<MatchSpec>,
    verified: bool,
    executed: bool,
    original: Option<String>,
}

impl StateUpdate {
    pub fn new(
        target_prefix: impl Into<PathBuf>,
        remove_specs: Vec<MatchSpec>,
        update_specs: Vec<MatchSpec>,
    ) -> Self {
        Self {
            target_prefix: target_prefix.into(),
            remove_specs,
            update_specs,
            verified: false,
            executed: false,
            original: None,
        }
    }

    pub fn verify(&mut self) -> Result<(), CoreError> {
        if !self.target_prefix.is_dir() {
            return Err(CoreError::InvalidInput(format!(
                "prefix {} is not a directory",
                self.target_prefix.display()
            )));
        }
        self.verified = true;
        Ok(())
    }

    /// Snapshot the current manifest, then reconcile it.
    pub fn execute(&mut self, history: &dyn HistorySource) -> Result<(), CoreError> {
        if !self.verified {
            self.verify()?;
        }
        let path = manifest_path(&self.target_prefix);
        self.original = if path.is_file() {
            Some(fs::read_to_string(&path)?)
        } else {
            None
        };
        self.executed = true;
        update_state(
            &self.target_prefix,
            &self.remove_specs,
            &self.update_specs,
            history,
        )?;
        Ok(())
    }

    /// Restore the manifest as it was before [`execute`](Self::execute), or
    /// delete it if `execute` created it.
    pub fn reverse(&self) -> Result<(), CoreError> {
        if !self.executed {
            return Ok(());
        }
        let path = manifest_path(&self.target_prefix);
        match &self.original {
            Some(text) => write_atomic(&path, text.as_bytes()),
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }

    pub fn cleanup(&mut self) {
        self.original = None;
    }
}
