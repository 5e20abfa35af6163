mod backend;
mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_STATE_ERROR};
use condecl_core::Context;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "condecl",
    version,
    about = "Declarative manifests for conda environments"
)]
struct Cli {
    /// Environment prefix (defaults to the rc file, then $CONDA_PREFIX).
    #[arg(short, long, global = true)]
    prefix: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Suppress progress output.
    #[arg(short, long, default_value_t = false, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check that a manifest file is valid.
    Validate {
        /// Path to manifest TOML file.
        #[arg(default_value = "conda.toml")]
        file: PathBuf,
    },
    /// Print the location of the environment manifest.
    Show {
        /// Print the manifest itself instead of its path.
        #[arg(long, default_value_t = false)]
        contents: bool,
    },
    /// Edit the environment manifest, creating it from history if missing.
    Edit {
        /// Apply the manifest after a successful edit.
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    /// Solve the manifest and install the result into the prefix.
    Apply {
        /// Solve only; change nothing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Write a lock checkpoint instead of installing.
        #[arg(long, default_value_t = false)]
        lock_only: bool,
    },
    /// Record added and removed packages in the manifest.
    Sync {
        /// Package spec to add or update (repeatable).
        #[arg(long = "add", value_name = "SPEC")]
        add: Vec<String>,
        /// Package spec to remove (repeatable).
        #[arg(long = "remove", value_name = "SPEC")]
        remove: Vec<String>,
    },
    /// Print the manifest as an environment request (JSON).
    Export {
        /// Environment to export from a multi-environment manifest.
        #[arg(short, long)]
        environment: Option<String>,
    },
    /// Create the manifest from an exported environment (JSON).
    Import {
        /// Path to the environment JSON file.
        file: PathBuf,
        /// Overwrite an existing manifest.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CONDECL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let mut ctx = match Context::load_default() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    if let Some(prefix) = cli.prefix {
        ctx = ctx.with_prefix(prefix);
    }
    ctx.quiet |= cli.quiet;
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Validate { file } => commands::validate::run(&file, json_output),
        Commands::Show { contents } => {
            commands::show::run(&ctx.target_prefix, contents, json_output)
        }
        Commands::Edit { apply } => commands::edit::run(&ctx, apply, json_output),
        Commands::Apply { dry_run, lock_only } => {
            commands::apply::run(&ctx, dry_run, lock_only, json_output)
        }
        Commands::Sync { add, remove } => {
            commands::sync::run(&ctx.target_prefix, &add, &remove, json_output)
        }
        Commands::Export { environment } => {
            commands::export::run(&ctx, environment.as_deref())
        }
        Commands::Import { file, force } => {
            commands::import::run(&ctx.target_prefix, &file, force, json_output)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:")
                || msg.starts_with("failed to parse manifest")
                || msg.starts_with("failed to read manifest")
                || msg.starts_with("manifest not found")
            {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("state error:") {
                EXIT_STATE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
