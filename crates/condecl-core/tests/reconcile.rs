//! Reconciliation tests against a real prefix directory with a fake install history.

use condecl_core::{
    init_manifest, manifest_path, read_manifest, update_state, CoreError, HistorySource,
    StateUpdate,
};
use condecl_schema::{Dependency, MatchSpec, TomlEnvironment};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

struct FakeHistory(Vec<&'static str>);

impl HistorySource for FakeHistory {
    fn requested_specs_map(&self) -> Result<BTreeMap<String, MatchSpec>, CoreError> {
        Ok(self
            .0
            .iter()
            .map(|s| {
                let spec: MatchSpec = s.parse().unwrap();
                (spec.name().to_owned(), spec)
            })
            .collect())
    }
}

fn specs(items: &[&str]) -> Vec<MatchSpec> {
    items.iter().map(|s| s.parse().unwrap()).collect()
}

fn dependency_names(prefix: &Path) -> Vec<String> {
    match read_manifest(prefix).unwrap() {
        TomlEnvironment::Single(doc) => doc
            .dependencies
            .iter()
            .map(|d| d.name().to_owned())
            .collect(),
        TomlEnvironment::Multi(_) => panic!("expected a single environment"),
    }
}

#[test]
fn add_to_history_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let history = FakeHistory(vec!["python"]);
    update_state(dir.path(), &[], &specs(&["flask"]), &history).unwrap();
    assert_eq!(dependency_names(dir.path()), vec!["flask", "python"]);
}

#[test]
fn remove_from_history_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let history = FakeHistory(vec!["python", "flask"]);
    update_state(dir.path(), &specs(&["flask"]), &[], &history).unwrap();
    assert_eq!(dependency_names(dir.path()), vec!["python"]);
}

#[test]
fn existing_manifest_takes_precedence_over_history() {
    let dir = tempfile::tempdir().unwrap();
    update_state(dir.path(), &[], &specs(&["numpy"]), &FakeHistory(vec![])).unwrap();
    update_state(dir.path(), &[], &specs(&["scipy"]), &FakeHistory(vec!["zlib"])).unwrap();
    assert_eq!(dependency_names(dir.path()), vec!["numpy", "scipy"]);
}

#[test]
fn removing_unknown_package_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let history = FakeHistory(vec!["python"]);
    update_state(dir.path(), &specs(&["libffi"]), &[], &history).unwrap();
    assert_eq!(dependency_names(dir.path()), vec!["python"]);
}

#[test]
fn update_wins_over_remove_of_same_name() {
    let dir = tempfile::tempdir().unwrap();
    let history = FakeHistory(vec!["python", "flask=2.0"]);
    let doc = update_state(
        dir.path(),
        &specs(&["flask"]),
        &specs(&["flask>=3"]),
        &history,
    )
    .unwrap();
    let flask = doc.dependencies.get("flask").unwrap().as_spec().unwrap();
    assert_eq!(flask.version(), Some(">=3"));
}

#[test]
fn last_update_wins_on_duplicate_names() {
    let dir = tempfile::tempdir().unwrap();
    let doc = update_state(
        dir.path(),
        &[],
        &specs(&["python=3.11", "python=3.12"]),
        &FakeHistory(vec![]),
    )
    .unwrap();
    let python = doc.dependencies.get("python").unwrap().as_spec().unwrap();
    assert_eq!(python.version(), Some("=3.12"));
}

#[test]
fn reconciliation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let history = FakeHistory(vec!["python", "pip"]);
    let remove = specs(&["pip"]);
    let update = specs(&["requests>=2", "conda-forge::numpy"]);

    update_state(dir.path(), &remove, &update, &history).unwrap();
    let first = fs::read(manifest_path(dir.path())).unwrap();
    update_state(dir.path(), &remove, &update, &history).unwrap();
    let second = fs::read(manifest_path(dir.path())).unwrap();
    assert_eq!(first, second);
}

#[test]
fn editables_and_pypi_survive_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest_path(dir.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        r#"
[about]
name = "app"
revision = "1"

[dependencies]
python = "3.12.*"
mylib = { path = "./mylib", editable = true }

[pypi-dependencies]
rich = ">=13"
"#,
    )
    .unwrap();

    let doc = update_state(dir.path(), &[], &specs(&["ruff"]), &FakeHistory(vec![])).unwrap();
    assert!(matches!(doc.dependencies.get("mylib"), Some(Dependency::Editable(_))));
    assert_eq!(doc.pypi_dependencies.get("rich").unwrap().version.as_deref(), Some(">=13"));
    assert_eq!(dependency_names(dir.path()), vec!["mylib", "python", "ruff"]);
}

#[test]
fn existing_about_block_is_kept_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest_path(dir.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        r#"
[about]
name = "svc"
revision = "7"
description = "payments backend"

[config]
channels = ["conda-forge"]

[dependencies]
python = "3.12.*"
"#,
    )
    .unwrap();

    let doc = update_state(dir.path(), &[], &specs(&["ruff"]), &FakeHistory(vec![])).unwrap();
    assert_eq!(doc.about.name, "svc");
    assert_eq!(doc.about.revision, "7");
    assert_eq!(doc.about.description.as_deref(), Some("payments backend"));
    assert_eq!(
        doc.config.and_then(|c| c.channels),
        Some(vec!["conda-forge".to_owned()])
    );

    let seeded = tempfile::tempdir().unwrap();
    let doc = update_state(seeded.path(), &[], &specs(&["ruff"]), &FakeHistory(vec![])).unwrap();
    assert_eq!(doc.about.revision, "1");
    assert!(doc.about.description.is_none());
}

#[test]
fn state_update_reverse_restores_original_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest_path(dir.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let original = "[about]\nname = \"x\"\nrevision = \"1\"\n\n[dependencies]\npython = \"*\"\n";
    fs::write(&path, original).unwrap();

    let mut action = StateUpdate::new(dir.path(), Vec::new(), specs(&["flask"]));
    action.verify().unwrap();
    action.execute(&FakeHistory(vec![])).unwrap();
    assert_ne!(fs::read_to_string(&path).unwrap(), original);

    action.reverse().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
    action.cleanup();
}

#[test]
fn state_update_reverse_deletes_created_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let mut action = StateUpdate::new(dir.path(), Vec::new(), specs(&["flask"]));
    action.execute(&FakeHistory(vec!["python"])).unwrap();
    assert!(manifest_path(dir.path()).is_file());
    action.reverse().unwrap();
    assert!(!manifest_path(dir.path()).exists());
}

#[test]
fn init_manifest_bootstraps_once() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("analysis");
    fs::create_dir_all(&prefix).unwrap();
    let history = FakeHistory(vec!["python=3.12", "pandas"]);

    let (old, new) = init_manifest(&prefix, &history).unwrap();
    assert!(old.is_empty());
    assert!(new.contains("name = \"analysis\""));
    assert!(new.contains("pandas"));

    let (old_again, new_again) = init_manifest(&prefix, &FakeHistory(vec![])).unwrap();
    assert_eq!(old_again, new);
    assert_eq!(new_again, new);
}

#[test]
fn missing_manifest_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        read_manifest(dir.path()),
        Err(CoreError::ManifestNotFound(_))
    ));
}
