use super::{describe, json_pretty, EXIT_SUCCESS};
use condecl_core::{read_manifest, Context, TomlSpec};

/// Print the prefix manifest as an environment request.
pub fn run(ctx: &Context, environment: Option<&str>) -> Result<u8, String> {
    let doc = read_manifest(&ctx.target_prefix).map_err(|e| describe(&e))?;
    let mut spec = TomlSpec::new(doc, ctx.clone());
    if let Some(name) = environment {
        spec = spec.with_environment_name(name);
    }
    let env = spec.environment().map_err(|e| describe(&e))?;
    println!("{}", json_pretty(&env)?);
    Ok(EXIT_SUCCESS)
}
