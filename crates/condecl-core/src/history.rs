//! Reader for the `conda-meta/history` log of an environment prefix.
//!
//! Each transaction starts with a `==> <date> <==` header and records the
//! user's request in comment lines such as `# update specs: ['flask']`.
//! Replaying those requests in order yields the packages the user asked
//! for explicitly, which seeds a manifest for prefixes that have none.

use crate::CoreError;
use condecl_schema::MatchSpec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Anything that can report the explicitly requested packages of a prefix.
pub trait HistorySource {
    fn requested_specs_map(&self) -> Result<BTreeMap<String, MatchSpec>, CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecAction {
    Update,
    Remove,
    Neutered,
}

/// One transaction in the history log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revision {
    pub date: String,
    pub command: Option<String>,
    pub update_specs: Vec<MatchSpec>,
    pub remove_specs: Vec<MatchSpec>,
    pub neutered_specs: Vec<MatchSpec>,
}

#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(prefix: &Path) -> Self {
        Self {
            path: prefix.join("conda-meta").join("history"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every revision. A missing history file has none.
    pub fn revisions(&self) -> Result<Vec<Revision>, CoreError> {
        if !self.path.exists() {
            debug!("no history at {}", self.path.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| CoreError::History(format!("{}: {e}", self.path.display())))?;
        Ok(parse_history(&content))
    }
}

impl HistorySource for History {
    fn requested_specs_map(&self) -> Result<BTreeMap<String, MatchSpec>, CoreError> {
        Ok(replay(&self.revisions()?))
    }
}

/// Apply each revision's requests in order. Within a revision removals
/// delete by name first, then updates and neutered specs insert by name.
pub fn replay(revisions: &[Revision]) -> BTreeMap<String, MatchSpec> {
    let mut specs = BTreeMap::new();
    for rev in revisions {
        for spec in &rev.remove_specs {
            specs.remove(spec.name());
        }
        for spec in &rev.update_specs {
            specs.insert(spec.name().to_owned(), spec.clone());
        }
        for spec in &rev.neutered_specs {
            specs.insert(spec.name().to_owned(), spec.clone());
        }
    }
    specs
}

pub fn parse_history(content: &str) -> Vec<Revision> {
    let mut revisions: Vec<Revision> = Vec::new();
    for line in content.lines().map(str::trim) {
        if let Some(date) = line
            .strip_prefix("==>")
            .and_then(|rest| rest.strip_suffix("<=="))
        {
            revisions.push(Revision {
                date: date.trim().to_owned(),
                ..Revision::default()
            });
            continue;
        }
        let Some(comment) = line.strip_prefix('#') else {
            continue;
        };
        let Some(current) = revisions.last_mut() else {
            continue;
        };
        let comment = comment.trim();
        if let Some(cmd) = comment.strip_prefix("cmd:") {
            current.command = Some(cmd.trim().to_owned());
            continue;
        }
        let Some((action, specs)) = parse_specs_comment(comment) else {
            continue;
        };
        let target = match action {
            SpecAction::Update => &mut current.update_specs,
            SpecAction::Remove => &mut current.remove_specs,
            SpecAction::Neutered => &mut current.neutered_specs,
        };
        for raw in specs {
            match raw.parse::<MatchSpec>() {
                Ok(spec) => target.push(spec),
                Err(e) => warn!("skipping unreadable spec '{raw}' in history: {e}"),
            }
        }
    }
    revisions
}

fn parse_specs_comment(comment: &str) -> Option<(SpecAction, Vec<String>)> {
    let (head, list) = comment.split_once(':')?;
    let action = match head.trim().strip_suffix("specs")?.trim() {
        "update" | "install" | "create" => SpecAction::Update,
        "remove" | "uninstall" => SpecAction::Remove,
        "neutered" => SpecAction::Neutered,
        _ => return None,
    };
    Some((action, split_spec_list(list)))
}

/// Split `['a', "b>=1,<2"]` (or an unquoted comma list) into its items.
fn split_spec_list(list: &str) -> Vec<String> {
    let inner = list.trim();
    let inner = inner
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(inner);
    if !inner.contains(['\'', '"']) {
        return inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
    }
    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for ch in inner.chars() {
        match quote {
            Some(q) if ch == q => {
                items.push(std::mem::take(&mut current));
                quote = None;
            }
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None => {}
        }
    }
    items.retain(|s| !s.trim().is_empty());
    items
}
