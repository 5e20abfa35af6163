use super::{colorize_action, describe, json_pretty, parse_spec_args, EXIT_SUCCESS};
use condecl_core::{History, StateUpdate};
use condecl_schema::Dependency;
use std::path::Path;
use tracing::warn;

/// Record `add` and `remove` requests in the prefix manifest.
///
/// This is what a package transaction runs once it has finished. If the
/// reconciler fails after writing, the manifest is put back the way it was.
pub fn run(prefix: &Path, add: &[String], remove: &[String], json: bool) -> Result<u8, String> {
    let update_specs = parse_spec_args(add)?;
    let remove_specs = parse_spec_args(remove)?;
    if update_specs.is_empty() && remove_specs.is_empty() {
        return Err("nothing to sync (pass --add or --remove)".to_owned());
    }

    let history = History::new(prefix);
    let mut action = StateUpdate::new(prefix, remove_specs, update_specs);
    action.verify().map_err(|e| describe(&e))?;
    if let Err(e) = action.execute(&history) {
        if let Err(rollback) = action.reverse() {
            warn!("failed to restore manifest: {rollback}");
        }
        return Err(describe(&e));
    }
    action.cleanup();

    let doc = condecl_core::state::from_env_file(prefix).map_err(|e| describe(&e))?;
    let dependencies: Vec<String> = doc
        .dependencies
        .iter()
        .map(|dep| match dep {
            Dependency::Spec(spec) => spec.to_string(),
            Dependency::Editable(pkg) => format!("{} (editable: {})", pkg.name, pkg.path),
        })
        .collect();

    if json {
        let payload = serde_json::json!({
            "manifest": condecl_core::manifest_path(prefix).display().to_string(),
            "added": add,
            "removed": remove,
            "dependencies": dependencies,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for spec in add {
            println!("{} {spec}", colorize_action("add"));
        }
        for spec in remove {
            println!("{} {spec}", colorize_action("remove"));
        }
        println!(
            "{} now lists {} dependencies",
            condecl_core::manifest_path(prefix).display(),
            dependencies.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
