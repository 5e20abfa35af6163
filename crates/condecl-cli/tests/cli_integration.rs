//! CLI subprocess integration tests.
//!
//! These tests invoke the `condecl` binary as a subprocess against a
//! temporary prefix and verify exit codes, stdout content, and JSON output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn condecl_bin(rc: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_condecl"));
    cmd.env("CONDECL_RC", rc);
    cmd.env_remove("CONDA_PREFIX");
    cmd.env_remove("CONDECL_LOG");
    cmd
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("env")).unwrap();
        Self { dir }
    }

    fn prefix(&self) -> PathBuf {
        self.dir.path().join("env")
    }

    fn rc(&self) -> PathBuf {
        self.dir.path().join("condeclrc.toml")
    }

    fn run(&self, args: &[&str]) -> Output {
        condecl_bin(&self.rc())
            .arg("--prefix")
            .arg(self.prefix())
            .args(args)
            .output()
            .unwrap()
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn manifest_text(&self) -> String {
        std::fs::read_to_string(self.prefix().join("conda-meta/conda.toml")).unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const SINGLE: &str = r#"
[about]
name = "demo"
revision = "1"

[config]
channels = ["conda-forge"]

[dependencies]
python = "3.12.*"
numpy = ">=1.26"

[pypi-dependencies]
rich = ">=13"
"#;

const MULTI: &str = r#"
[about]
name = "stack"
revision = "1"

[groups.base.dependencies]
python = "3.12.*"

[groups.test.dependencies]
pytest = "*"

[groups.docs.dependencies]
sphinx = "*"

[environments]
default = ["base"]
ci = ["base", "test"]
"#;

#[test]
fn cli_version_exits_zero() {
    let fx = Fixture::new();
    let output = condecl_bin(&fx.rc()).arg("--version").output().unwrap();
    assert!(output.status.success(), "condecl --version must exit 0");
    assert!(stdout(&output).contains("condecl"));
}

#[test]
fn cli_help_lists_commands() {
    let fx = Fixture::new();
    let output = condecl_bin(&fx.rc()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for command in ["validate", "show", "edit", "apply", "sync", "export", "import"] {
        assert!(out.contains(command), "help must list '{command}': {out}");
    }
}

#[test]
fn cli_validate_single_manifest() {
    let fx = Fixture::new();
    let path = fx.write("conda.toml", SINGLE);
    let output = fx.run(&["validate", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("valid single-environment manifest"));
}

#[test]
fn cli_validate_multi_manifest_reports_unused_groups() {
    let fx = Fixture::new();
    let path = fx.write("conda.toml", MULTI);
    let output = fx.run(&["--json", "validate", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["layout"], "multi");
    assert_eq!(json["name"], "stack");
    assert_eq!(json["environments"], serde_json::json!(["ci", "default"]));
    assert!(json["warnings"][0].as_str().unwrap().contains("docs"));
}

#[test]
fn cli_validate_invalid_manifest_exits_2() {
    let fx = Fixture::new();
    let path = fx.write(
        "conda.toml",
        "[about]\nname = \"x\"\nrevision = \"1\"\n\n[dependencies]\npython = 3\n",
    );
    let output = fx.run(&["validate", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("manifest error:"));
}

#[test]
fn cli_show_prints_manifest_path() {
    let fx = Fixture::new();
    let output = fx.run(&["show"]);
    assert!(output.status.success());
    assert!(stdout(&output).trim_end().ends_with("conda.toml"));
}

#[test]
fn cli_show_contents_without_manifest_exits_2() {
    let fx = Fixture::new();
    let output = fx.run(&["show", "--contents"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("manifest not found"));
}

#[test]
fn cli_sync_adds_and_removes() {
    let fx = Fixture::new();
    let output = fx.run(&["sync", "--add", "python=3.12", "--add", "flask"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = fx.run(&["--json", "sync", "--remove", "flask", "--add", "requests>=2"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        json["dependencies"],
        serde_json::json!(["python=3.12", "requests>=2"])
    );

    let output = fx.run(&["show", "--contents"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("requests"));
    assert!(!text.contains("flask"));
}

#[test]
fn cli_sync_seeds_from_history() {
    let fx = Fixture::new();
    let meta = fx.prefix().join("conda-meta");
    std::fs::create_dir_all(&meta).unwrap();
    std::fs::write(
        meta.join("history"),
        "==> 2024-03-01 10:00:00 <==\n# cmd: conda install python pandas\n# update specs: ['python', 'pandas']\n",
    )
    .unwrap();
    let output = fx.run(&["sync", "--remove", "pandas"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = fx.manifest_text();
    assert!(text.contains("python"));
    assert!(!text.contains("pandas"));
}

#[test]
fn cli_sync_without_specs_fails() {
    let fx = Fixture::new();
    let output = fx.run(&["sync"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_export_emits_environment_json() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.prefix().join("conda-meta")).unwrap();
    std::fs::write(fx.prefix().join("conda-meta/conda.toml"), SINGLE).unwrap();

    let output = fx.run(&["export"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["name"], "demo");
    let requested: Vec<&str> = json["requested_packages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(requested, vec!["numpy>=1.26", "python 3.12.*"]);
    assert_eq!(json["external_packages"]["pip"], serde_json::json!(["rich>=13"]));
}

#[test]
fn cli_export_multi_environment_by_name() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.prefix().join("conda-meta")).unwrap();
    std::fs::write(fx.prefix().join("conda-meta/conda.toml"), MULTI).unwrap();

    let output = fx.run(&["export", "--environment", "ci"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["requested_packages"], serde_json::json!(["pytest", "python 3.12.*"]));

    let output = fx.run(&["export", "--environment", "nope"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_import_writes_manifest_and_refuses_overwrite() {
    let fx = Fixture::new();
    let env = fx.write(
        "env.json",
        r#"{
  "prefix": "/opt/envs/imported",
  "platform": "linux-64",
  "name": "imported",
  "requested_packages": ["python>=3.11", "conda-forge::numpy"],
  "external_packages": {"pip": ["requests==2.31"]}
}"#,
    );
    let output = fx.run(&["import", env.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = fx.manifest_text();
    assert!(text.contains("name = \"imported\""));
    assert!(text.contains("requests"));

    let output = fx.run(&["import", env.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--force"));

    let output = fx.run(&["import", "--force", env.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
}

#[test]
fn cli_edit_without_changes_bootstraps_manifest() {
    let fx = Fixture::new();
    let output = condecl_bin(&fx.rc())
        .env("VISUAL", "true")
        .env("EDITOR", "true")
        .arg("--prefix")
        .arg(fx.prefix())
        .arg("edit")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("created"));
    assert!(out.contains("no changes"));
    assert!(fx.manifest_text().contains("name = \"env\""));
}

#[test]
fn cli_apply_without_solver_fails() {
    let fx = Fixture::new();
    fx.run(&["sync", "--add", "python"]);
    let output = fx.run(&["apply", "--dry-run"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no solver configured"));
}

#[cfg(unix)]
#[test]
fn cli_apply_lock_only_with_helper_solver() {
    let fx = Fixture::new();
    let script = fx.write(
        "solver.sh",
        "#!/bin/sh\ncat > /dev/null\necho '[{\"name\":\"python\",\"version\":\"3.12.1\",\"build\":\"h0\",\"channel\":\"conda-forge\",\"subdir\":\"linux-64\",\"fn\":\"python-3.12.1-h0.conda\"},{\"name\":\"python\",\"version\":\"3.12.1\",\"build\":\"h0\",\"channel\":\"conda-forge\",\"subdir\":\"linux-64\",\"fn\":\"python-3.12.1-h0.conda\"}]'\n",
    );
    std::fs::write(
        fx.rc(),
        format!("solver-command = \"sh {}\"\n", script.display()),
    )
    .unwrap();
    fx.run(&["sync", "--add", "python"]);

    let output = fx.run(&["--json", "apply", "--lock-only"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["status"], "locked");
    assert_eq!(json["records"].as_array().unwrap().len(), 1);
    let lockdir = PathBuf::from(json["lockdir"].as_str().unwrap());
    assert!(lockdir.join("python-3.12.1-h0.json").is_file());
}

#[cfg(unix)]
#[test]
fn cli_apply_passes_system_requirements_to_solver() {
    let fx = Fixture::new();
    let script = fx.write(
        "solver.sh",
        r##"#!/bin/sh
cat > /dev/null
printf '[{"name":"cuda-%s","version":"1","build":"0","channel":"c","subdir":"linux-64","fn":"x-1-0.conda"}]' "$CONDA_OVERRIDE_CUDA"
"##,
    );
    std::fs::write(
        fx.rc(),
        format!("solver-command = \"sh {}\"\n", script.display()),
    )
    .unwrap();
    std::fs::create_dir_all(fx.prefix().join("conda-meta")).unwrap();
    std::fs::write(
        fx.prefix().join("conda-meta/conda.toml"),
        "[about]\nname = \"gpu\"\nrevision = \"1\"\n\n[system-requirements]\ncuda = \"12\"\n\n[dependencies]\npython = \"*\"\n",
    )
    .unwrap();

    let output = fx.run(&["--json", "apply", "--dry-run"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["status"], "dry-run");
    assert_eq!(json["records"][0]["name"], "cuda-12");

    let output = fx.run(&["export"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!stdout(&output).contains("CONDA_OVERRIDE_CUDA"));
}
