use super::{colorize_action, describe, json_pretty, ConsoleReporter, EXIT_SUCCESS};
use crate::backend::{CommandLinker, CommandSolver};
use condecl_core::{
    read_manifest, ApplyOptions, ApplyOutcome, Context, NullReporter, Reporter, TomlSpec,
};

pub fn run(ctx: &Context, dry_run: bool, lock_only: bool, json: bool) -> Result<u8, String> {
    let solver_command = ctx.solver_command.as_deref().ok_or_else(|| {
        "no solver configured (set solver-command in the rc file)".to_owned()
    })?;
    let doc = read_manifest(&ctx.target_prefix).map_err(|e| describe(&e))?;
    let overrides = TomlSpec::new(doc, ctx.clone())
        .virtual_package_overrides()
        .map_err(|e| describe(&e))?;
    let solver = CommandSolver::new(solver_command).with_env(overrides);
    // Linking is only needed when the records are actually installed.
    let linker_command = match ctx.linker_command.as_deref() {
        Some(command) => command,
        None if dry_run || lock_only || ctx.dry_run => "",
        None => return Err("no linker configured (set linker-command in the rc file)".to_owned()),
    };
    let linker = CommandLinker::new(linker_command);

    let options = ApplyOptions {
        quiet: ctx.quiet || json,
        dry_run,
        lock_only,
    };
    let console = ConsoleReporter::default();
    let reporter: &dyn Reporter = if json { &NullReporter } else { &console };
    let outcome =
        condecl_core::apply(ctx, options, &solver, &linker, reporter).map_err(|e| describe(&e))?;

    let (status, lockdir) = match &outcome {
        ApplyOutcome::DryRun { .. } => ("dry-run", None),
        ApplyOutcome::LockOnly { lockdir, .. } => ("locked", Some(lockdir.display().to_string())),
        ApplyOutcome::Linked { .. } => ("linked", None),
    };
    if json {
        let payload = serde_json::json!({
            "status": status,
            "prefix": ctx.target_prefix.display().to_string(),
            "lockdir": lockdir,
            "records": outcome.records(),
        });
        println!("{}", json_pretty(&payload)?);
    } else if matches!(outcome, ApplyOutcome::DryRun { .. }) && !ctx.quiet {
        println!(
            "{} {} package(s) would be installed",
            colorize_action(status),
            outcome.records().len()
        );
    }
    Ok(EXIT_SUCCESS)
}
