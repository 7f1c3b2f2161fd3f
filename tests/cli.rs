//! End-to-end tests for the tasc binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn tasc() -> Command {
    Command::cargo_bin("tasc").unwrap()
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

const GREET: &str = "vars:\n  greeting: Hello\ntasks:\n  greet:\n    desc: Say hello\n    cmd: echo {{ vars.greeting }}\n";

#[test]
fn compiles_default_entry_to_stdout() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "tasks.yaml", GREET);

    tasc()
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("greet() {"))
        .stdout(predicate::str::contains("echo Hello"))
        .stdout(predicate::str::starts_with("#!/usr/bin/env bash"));
}

#[test]
fn compiles_explicit_entry_to_file() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "build.yaml", GREET);
    let out = temp.path().join("run.sh");

    tasc()
        .current_dir(temp.path())
        .args(["compile", "build.yaml", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 1 task functions"));

    let script = std::fs::read_to_string(&out).unwrap();
    assert!(script.contains("set -euo pipefail"));
    assert!(script.contains("greet() {"));
}

#[test]
fn missing_entry_is_a_loader_error() {
    let temp = tempfile::tempdir().unwrap();

    tasc()
        .current_dir(temp.path())
        .assert()
        .code(66)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn schema_violation_exits_with_data_error() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "tasks.yaml", "surprise: true\n");

    tasc()
        .current_dir(temp.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains("surprise"));
}

#[test]
fn feature_flag_selects_variant() {
    let temp = tempfile::tempdir().unwrap();
    write(
        temp.path(),
        "tasks.yaml",
        "vars:\n  mode: local\n  \"mode[ci]\": ci\ntasks:\n  show:\n    cmd: echo {{ vars.mode }}\n",
    );

    tasc()
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("echo local"));

    tasc()
        .current_dir(temp.path())
        .args(["-F", "ci"])
        .assert()
        .success()
        .stdout(predicate::str::contains("echo ci"));
}

#[test]
fn list_plain_names_only() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "tasks.yaml", GREET);

    tasc()
        .current_dir(temp.path())
        .args(["list", "--format", "plain"])
        .assert()
        .success()
        .stdout("greet\n");
}

#[test]
fn check_reports_counts() {
    let temp = tempfile::tempdir().unwrap();
    write(
        temp.path(),
        "tasks.yaml",
        "tasks:\n  main:\n    cmd: \"{{ tasks.helper }}\"\n  helper:\n    cmd: echo hi\n",
    );

    tasc()
        .current_dir(temp.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 tasks, 1 dependencies"));
}

#[test]
fn circular_modules_are_reported() {
    let temp = tempfile::tempdir().unwrap();
    write(temp.path(), "tasks.yaml", "uses: ./other\n");
    write(temp.path(), "other.yaml", "uses: ./tasks\n");

    tasc()
        .current_dir(temp.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Circular module dependency"));
}
