use super::{json_pretty, EXIT_SUCCESS};
use condecl_core::{manifest_path, CoreError};
use std::path::Path;

pub fn run(prefix: &Path, contents: bool, json: bool) -> Result<u8, String> {
    let path = manifest_path(prefix);
    if !contents {
        if json {
            let payload = serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.is_file(),
            });
            println!("{}", json_pretty(&payload)?);
        } else {
            println!("{}", path.display());
        }
        return Ok(EXIT_SUCCESS);
    }

    if !path.is_file() {
        return Err(CoreError::ManifestNotFound(path).to_string());
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| format!("failed to read manifest {}: {e}", path.display()))?;
    if json {
        let table: toml::Table = toml::from_str(&text)
            .map_err(|e| format!("failed to parse manifest {}: {e}", path.display()))?;
        let payload = serde_json::json!({
            "path": path.display().to_string(),
            "manifest": table,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print!("{text}");
    }
    Ok(EXIT_SUCCESS)
}
