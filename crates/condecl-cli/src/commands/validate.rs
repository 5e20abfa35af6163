use super::{json_pretty, EXIT_SUCCESS};
use condecl_schema::{parse_manifest_file, TomlEnvironment};
use std::path::Path;

pub fn run(file: &Path, json: bool) -> Result<u8, String> {
    let doc = parse_manifest_file(file).map_err(|e| format!("manifest error: {e}"))?;

    let (layout, environments, warnings) = match &doc {
        TomlEnvironment::Single(_) => ("single", Vec::new(), Vec::new()),
        TomlEnvironment::Multi(multi) => (
            "multi",
            multi.environment_names(),
            multi
                .warnings()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        ),
    };

    if json {
        let payload = serde_json::json!({
            "file": file.display().to_string(),
            "valid": true,
            "layout": layout,
            "name": doc.about().name,
            "environments": environments,
            "warnings": warnings,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}: valid {layout}-environment manifest", file.display());
        if !environments.is_empty() {
            println!("environments: {}", environments.join(", "));
        }
        for warning in &warnings {
            println!("warning: {warning}");
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_manifest_error_is_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conda.toml");
        std::fs::write(&path, "[about]\nname = \"x\"\nrevision = \"1\"\n").unwrap();
        let err = run(&path, true).unwrap_err();
        assert!(err.starts_with("manifest error:"), "{err}");
    }

    #[test]
    fn missing_file_is_a_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("absent.toml"), false).unwrap_err();
        assert!(err.starts_with("manifest error:"));
    }
}
