//! Rendering a prefix's manifest to disk: solve, then lock or link.
//!
//! Solving and linking are done by collaborators behind the [`Solver`] and
//! [`Linker`] traits; progress goes to an injected [`Reporter`]. Nothing here
//! touches the prefix except the lock checkpoint directory.

use crate::bridge::TomlSpec;
use crate::context::Context;
use crate::state::read_manifest;
use crate::{write_atomic, CoreError};
use condecl_schema::{MatchSpec, Subdir};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Checkpoint directory for lock-only applies, relative to the prefix.
pub const HISTORY_D: &str = "conda-meta/.history.d";

/// One resolved package archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub build: String,
    #[serde(default)]
    pub build_number: u64,
    pub channel: String,
    pub subdir: Subdir,
    #[serde(rename = "fn")]
    pub filename: String,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl PackageRecord {
    /// Archive filename without its `.tar.bz2` or `.conda` extension.
    pub fn dist_name(&self) -> &str {
        self.filename
            .strip_suffix(".tar.bz2")
            .or_else(|| self.filename.strip_suffix(".conda"))
            .unwrap_or(&self.filename)
    }

    fn identity(&self) -> (&str, &str, &str) {
        (&self.channel, self.subdir.as_str(), &self.filename)
    }
}

impl std::fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}::{}-{}-{}",
            self.channel, self.subdir, self.name, self.version, self.build
        )
    }
}

pub trait Solver {
    /// Resolve `specs` into the full set of records that should be installed.
    /// The result may contain repeats.
    fn solve(
        &self,
        prefix: &Path,
        channels: &[String],
        subdirs: &[Subdir],
        specs: &[MatchSpec],
    ) -> Result<Vec<PackageRecord>, CoreError>;
}

pub trait Linker {
    /// Make `prefix` contain exactly `records`.
    fn link(&self, prefix: &Path, records: &[PackageRecord]) -> Result<(), CoreError>;
}

/// Progress sink for [`apply`]. Every method defaults to doing nothing.
pub trait Reporter {
    fn solving(&self, _specs: &[MatchSpec]) {}
    fn solved(&self, _records: &[PackageRecord]) {}
    fn locked(&self, _lockdir: &Path) {}
    fn linked(&self, _records: &[PackageRecord]) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Skip reporter callbacks.
    pub quiet: bool,
    /// Solve only; change nothing.
    pub dry_run: bool,
    /// Write a lock checkpoint instead of linking.
    pub lock_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    DryRun { records: Vec<PackageRecord> },
    LockOnly { lockdir: PathBuf, records: Vec<PackageRecord> },
    Linked { records: Vec<PackageRecord> },
}

impl ApplyOutcome {
    pub fn records(&self) -> &[PackageRecord] {
        match self {
            ApplyOutcome::DryRun { records }
            | ApplyOutcome::LockOnly { records, .. }
            | ApplyOutcome::Linked { records } => records,
        }
    }
}

/// Solve and drop repeated records, keeping the first occurrence of each.
pub fn solve(
    solver: &dyn Solver,
    prefix: &Path,
    channels: &[String],
    subdirs: &[Subdir],
    specs: &[MatchSpec],
) -> Result<Vec<PackageRecord>, CoreError> {
    let raw = solver.solve(prefix, channels, subdirs, specs)?;
    let total = raw.len();
    let mut seen = HashSet::with_capacity(total);
    let mut records = Vec::with_capacity(total);
    for record in raw {
        let key = record.identity();
        let key = (key.0.to_owned(), key.1.to_owned(), key.2.to_owned());
        if seen.insert(key) {
            records.push(record);
        }
    }
    if records.len() != total {
        debug!("solver returned {} duplicate record(s)", total - records.len());
    }
    Ok(records)
}

/// Write one JSON file per record into a fresh checkpoint directory under
/// `conda-meta/.history.d/<millis>/`.
pub fn lock(prefix: &Path, records: &[PackageRecord]) -> Result<PathBuf, CoreError> {
    let base = prefix.join(HISTORY_D);
    std::fs::create_dir_all(&base)?;
    let mut stamp = chrono::Utc::now().timestamp_millis();
    let lockdir = loop {
        let candidate = base.join(stamp.to_string());
        match std::fs::create_dir(&candidate) {
            Ok(()) => break candidate,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => stamp += 1,
            Err(e) => return Err(e.into()),
        }
    };
    for record in records {
        let content = serde_json::to_string_pretty(record)?;
        let dest = lockdir.join(format!("{}.json", record.dist_name()));
        write_atomic(&dest, content.as_bytes())?;
    }
    info!("locked {} record(s) in {}", records.len(), lockdir.display());
    Ok(lockdir)
}

/// Render the manifest in `ctx.target_prefix` to disk.
pub fn apply(
    ctx: &Context,
    options: ApplyOptions,
    solver: &dyn Solver,
    linker: &dyn Linker,
    reporter: &dyn Reporter,
) -> Result<ApplyOutcome, CoreError> {
    let prefix = ctx.target_prefix.as_path();
    let doc = read_manifest(prefix)?;
    let env = TomlSpec::new(doc, ctx.clone()).environment()?;
    let channels = env.config.channels.clone().unwrap_or_default();

    if !options.quiet {
        reporter.solving(&env.requested_packages);
    }
    let records = solve(solver, prefix, &channels, &ctx.subdirs(), &env.requested_packages)?;
    if !options.quiet {
        reporter.solved(&records);
    }

    if options.dry_run || ctx.dry_run {
        info!("dry run: {} record(s) would be installed", records.len());
        return Ok(ApplyOutcome::DryRun { records });
    }

    if options.lock_only {
        let lockdir = lock(prefix, &records)?;
        if !options.quiet {
            reporter.locked(&lockdir);
        }
        return Ok(ApplyOutcome::LockOnly { lockdir, records });
    }

    linker.link(prefix, &records)?;
    if !options.quiet {
        reporter.linked(&records);
    }
    Ok(ApplyOutcome::Linked { records })
}
