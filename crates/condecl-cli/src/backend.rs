//! Solver and linker backends that delegate to external helper programs.
//!
//! The helper is started with the request as JSON on stdin and must print its
//! answer as JSON on stdout. A non-zero exit status fails the step, with the
//! helper's stderr as the message.

use condecl_core::{CoreError, Linker, PackageRecord, Solver};
use condecl_schema::{MatchSpec, Subdir};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Serialize)]
struct SolveRequest<'a> {
    prefix: &'a Path,
    channels: &'a [String],
    subdirs: &'a [Subdir],
    specs: &'a [MatchSpec],
}

#[derive(Serialize)]
struct LinkRequest<'a> {
    prefix: &'a Path,
    records: &'a [PackageRecord],
}

fn split_command(command: &str) -> Result<(String, Vec<String>), String> {
    let mut parts = command.split_whitespace().map(str::to_owned);
    let program = parts
        .next()
        .ok_or_else(|| "helper command is empty".to_owned())?;
    Ok((program, parts.collect()))
}

/// Run `command` with `input` on stdin and return its stdout.
///
/// Stdin is fed from a separate thread while the output pipes drain, so a
/// helper that answers before reading its whole request cannot stall.
fn run_helper(
    command: &str,
    input: &[u8],
    env: &BTreeMap<String, String>,
) -> Result<Vec<u8>, String> {
    let (program, args) = split_command(command)?;
    debug!("running helper: {command}");
    let mut child = Command::new(&program)
        .args(&args)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to start '{program}': {e}"))?;
    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_vec();
        std::thread::spawn(move || stdin.write_all(&input))
    });
    let output = child
        .wait_with_output()
        .map_err(|e| format!("failed to wait for '{program}': {e}"))?;
    let written = match writer {
        Some(handle) => handle
            .join()
            .map_err(|_| format!("stdin writer for '{program}' panicked"))?,
        None => Ok(()),
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("'{program}' exited with {}: {}", output.status, stderr.trim()));
    }
    match written {
        // The helper may legitimately stop reading once it has its answer.
        Err(e) if e.kind() != ErrorKind::BrokenPipe => {
            Err(format!("failed to write to '{program}': {e}"))
        }
        _ => Ok(output.stdout),
    }
}

pub struct CommandSolver {
    command: String,
    env: BTreeMap<String, String>,
}

impl CommandSolver {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
        }
    }

    /// Extra variables for the helper's process environment, such as
    /// `CONDA_OVERRIDE_*` virtual package overrides.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }
}

impl Solver for CommandSolver {
    fn solve(
        &self,
        prefix: &Path,
        channels: &[String],
        subdirs: &[Subdir],
        specs: &[MatchSpec],
    ) -> Result<Vec<PackageRecord>, CoreError> {
        let request = serde_json::to_vec(&SolveRequest {
            prefix,
            channels,
            subdirs,
            specs,
        })?;
        let stdout = run_helper(&self.command, &request, &self.env).map_err(CoreError::Solve)?;
        serde_json::from_slice(&stdout)
            .map_err(|e| CoreError::Solve(format!("invalid solver output: {e}")))
    }
}

pub struct CommandLinker {
    command: String,
}

impl CommandLinker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Linker for CommandLinker {
    fn link(&self, prefix: &Path, records: &[PackageRecord]) -> Result<(), CoreError> {
        let request = serde_json::to_vec(&LinkRequest { prefix, records })?;
        run_helper(&self.command, &request, &BTreeMap::new()).map_err(CoreError::Link)?;
        Ok(())
    }
}
