use super::{describe, json_pretty, EXIT_SUCCESS};
use condecl_core::state::parse_state_text;
use condecl_core::{init_manifest, manifest_path, Context, History};
use dialoguer::Confirm;
use std::io::{stderr, stdin, IsTerminal};
use std::path::Path;
use std::process::Command;
use tracing::debug;

fn editor_command() -> String {
    std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| "vi".to_owned())
}

fn launch_editor(editor: &str, file: &Path) -> Result<(), String> {
    let mut parts = editor.split_whitespace();
    let program = parts.next().ok_or_else(|| "editor command is empty".to_owned())?;
    debug!("launching editor: {editor} {}", file.display());
    let status = Command::new(program)
        .args(parts)
        .arg(file)
        .status()
        .map_err(|e| format!("failed to launch editor '{program}': {e}"))?;
    if !status.success() {
        return Err(format!("editor '{program}' exited with {status}"));
    }
    Ok(())
}

/// Open the prefix manifest in `$VISUAL` / `$EDITOR`.
///
/// The edit happens on a scratch copy next to the manifest; the manifest is
/// only replaced once the edited text validates.
pub fn run(ctx: &Context, apply: bool, json: bool) -> Result<u8, String> {
    let prefix = ctx.target_prefix.as_path();
    let path = manifest_path(prefix);
    let (old, current) = init_manifest(prefix, &History::new(prefix)).map_err(|e| describe(&e))?;
    let created = old.is_empty();

    let dir = path
        .parent()
        .ok_or_else(|| format!("invalid manifest path {}", path.display()))?;
    let scratch = tempfile::Builder::new()
        .prefix("conda.")
        .suffix(".toml")
        .tempfile_in(dir)
        .map_err(|e| format!("state error: create scratch file: {e}"))?;
    std::fs::write(scratch.path(), &current)
        .map_err(|e| format!("state error: write scratch file: {e}"))?;

    let is_tty = stdin().is_terminal() && stderr().is_terminal();
    let editor = editor_command();
    let edited = loop {
        launch_editor(&editor, scratch.path())?;
        let text = std::fs::read_to_string(scratch.path())
            .map_err(|e| format!("state error: read scratch file: {e}"))?;
        match parse_state_text(&text) {
            Ok(_) => break text,
            Err(e) => {
                let retry = is_tty
                    && Confirm::new()
                        .with_prompt(format!("{e}\nedit again?"))
                        .default(true)
                        .interact()
                        .map_err(|e| format!("prompt failed: {e}"))?;
                if !retry {
                    return Err(format!("manifest error: {e} (manifest left unchanged)"));
                }
            }
        }
    };

    let changed = edited != current;
    if changed {
        scratch
            .persist(&path)
            .map_err(|e| format!("state error: replace manifest: {}", e.error))?;
    }

    if json {
        let payload = serde_json::json!({
            "path": path.display().to_string(),
            "created": created,
            "changed": changed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        if created {
            println!("created {}", path.display());
        }
        if changed {
            println!("changes detected in {}", path.display());
        } else {
            println!("no changes");
        }
    }

    if apply && changed {
        return super::apply::run(ctx, false, false, json);
    }
    Ok(EXIT_SUCCESS)
}
