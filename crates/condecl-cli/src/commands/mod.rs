pub mod apply;
pub mod edit;
pub mod export;
pub mod import;
pub mod show;
pub mod sync;
pub mod validate;

use condecl_core::{CoreError, PackageRecord, Reporter};
use condecl_schema::MatchSpec;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_STATE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

/// Render a core error with the prefix `main` uses to pick the exit code.
pub fn describe(err: &CoreError) -> String {
    match err {
        CoreError::Manifest(_) | CoreError::ManifestNotFound(_) | CoreError::MisroutedEnvironment => {
            err.to_string()
        }
        CoreError::Io(_) | CoreError::ConcurrentModification(_) | CoreError::History(_) => {
            format!("state error: {err}")
        }
        _ => err.to_string(),
    }
}

pub fn parse_spec_args(args: &[String]) -> Result<Vec<MatchSpec>, String> {
    condecl_schema::parse_specs(args).map_err(|e| format!("invalid package spec: {e}"))
}

pub fn colorize_action(action: &str) -> String {
    use console::Style;
    match action {
        "add" | "linked" => Style::new().green().apply_to(action).to_string(),
        "remove" => Style::new().red().apply_to(action).to_string(),
        "locked" => Style::new().cyan().apply_to(action).to_string(),
        "dry-run" => Style::new().yellow().apply_to(action).to_string(),
        other => other.to_owned(),
    }
}

/// Progress output for `apply` on a terminal.
#[derive(Default)]
pub struct ConsoleReporter {
    pb: RefCell<Option<ProgressBar>>,
}

impl Reporter for ConsoleReporter {
    fn solving(&self, specs: &[MatchSpec]) {
        *self.pb.borrow_mut() = Some(spinner(&format!("solving {} spec(s)...", specs.len())));
    }

    fn solved(&self, records: &[PackageRecord]) {
        if let Some(pb) = self.pb.borrow_mut().take() {
            spin_ok(&pb, &format!("solved {} package(s)", records.len()));
        }
        for record in records {
            println!("  {record}");
        }
    }

    fn locked(&self, lockdir: &Path) {
        println!("{} {}", colorize_action("locked"), lockdir.display());
    }

    fn linked(&self, records: &[PackageRecord]) {
        println!("{} {} package(s)", colorize_action("linked"), records.len());
    }
}
