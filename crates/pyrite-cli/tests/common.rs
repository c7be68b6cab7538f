#![allow(dead_code)]

use std::{fs, path::PathBuf};

use assert_cmd::assert::Assert;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// A `pyrite` invocation with config isolated to `config_dir`.
pub fn pyrite(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pyrite").expect("pyrite binary");
    cmd.env("PYRITE_CONFIG_DIR", config_dir.path());
    cmd.env("PYRITE_OFFLINE", "1");
    cmd.env_remove("NO_COLOR");
    cmd
}

pub fn config_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("pyrite-config")
        .tempdir()
        .expect("config tempdir")
}

/// A throwaway project directory with the given dependencies array.
pub fn prepare_project(prefix: &str, deps: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("tempdir");
    let project = temp.path().join("sample_app");
    fs::create_dir_all(&project).expect("project dir");
    fs::write(
        project.join("pyproject.toml"),
        format!(
            "[project]\nname = \"sample-app\"\nrequires-python = \">=3.6\"\ndependencies = {deps}\n"
        ),
    )
    .expect("write pyproject");
    (temp, project)
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json output")
}
