use super::{describe, json_pretty, EXIT_SUCCESS};
use condecl_core::bridge::environment_to_model;
use condecl_core::state::to_env_file;
use condecl_core::{manifest_path, Environment};
use dialoguer::Confirm;
use std::io::{stderr, stdin, IsTerminal};
use std::path::Path;
use tracing::warn;

fn ensure_can_write(dest: &Path, force: bool, is_tty: bool) -> Result<(), String> {
    if !dest.exists() || force {
        return Ok(());
    }
    let refuse = || format!("refusing to overwrite existing {} (pass --force)", dest.display());
    if !is_tty {
        return Err(refuse());
    }
    let overwrite = Confirm::new()
        .with_prompt(format!("overwrite {}?", dest.display()))
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if overwrite {
        Ok(())
    } else {
        Err(refuse())
    }
}

/// Write a manifest built from an exported environment JSON file.
///
/// Metadata, platform blocks and groups cannot be recovered from an
/// environment, so the result is a plain single-environment manifest.
pub fn run(prefix: &Path, file: &Path, force: bool, json: bool) -> Result<u8, String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let env: Environment = serde_json::from_str(&content)
        .map_err(|e| format!("invalid environment file {}: {e}", file.display()))?;
    let doc = environment_to_model(&env).map_err(|e| describe(&e))?;

    let dest = manifest_path(prefix);
    let is_tty = stdin().is_terminal() && stderr().is_terminal();
    ensure_can_write(&dest, force, is_tty)?;
    warn!("import is lossy: manifest metadata and platform overrides are not recovered");
    to_env_file(prefix, &doc).map_err(|e| format!("state error: {e}"))?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": dest.display().to_string(),
            "dependencies": doc.dependencies.len(),
            "pypi_dependencies": doc.pypi_dependencies.len(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "wrote {} ({} dependencies, {} pypi dependencies)",
            dest.display(),
            doc.dependencies.len(),
            doc.pypi_dependencies.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
