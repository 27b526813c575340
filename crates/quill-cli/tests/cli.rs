//! CLI integration tests.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn quill(notebooks: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("quill").unwrap();
    cmd.arg("--notebooks-dir").arg(notebooks.path());
    cmd
}

fn has_python() -> bool {
    quill_core::KernelConfig::default().python_executable().is_ok()
}

#[test]
fn test_help() {
    Command::cargo_bin("quill")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_new_list_show_delete() {
    let temp = TempDir::new().unwrap();

    quill(&temp)
        .args(["new", "analysis", "--title", "Quarterly analysis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("analysis.ipynb"));
    assert!(temp.path().join("analysis.ipynb").exists());

    quill(&temp)
        .args(["new", "analysis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    quill(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Quarterly analysis"));

    quill(&temp)
        .args(["show", "analysis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("In [ ]:"));

    quill(&temp).args(["delete", "analysis"]).assert().success();
    quill(&temp)
        .args(["delete", "analysis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Notebook not found"));
}

#[test]
fn test_list_empty() {
    let temp = TempDir::new().unwrap();
    quill(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No notebooks"));
}

#[test]
fn test_rejects_path_ids() {
    let temp = TempDir::new().unwrap();
    quill(&temp)
        .args(["show", "../outside"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid notebook id"));
}

#[test]
fn test_exec_expression_json() {
    if !has_python() {
        eprintln!("skipping: no Python interpreter found");
        return;
    }
    let temp = TempDir::new().unwrap();
    let output = quill(&temp)
        .arg("--cwd")
        .arg(temp.path())
        .args(["exec", "--json", "2 + 2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["output"]["type"], "text");
    assert_eq!(json["output"]["content"], "4");
}

#[test]
fn test_exec_stdin_and_error_exit() {
    if !has_python() {
        eprintln!("skipping: no Python interpreter found");
        return;
    }
    let temp = TempDir::new().unwrap();
    quill(&temp)
        .arg("--cwd")
        .arg(temp.path())
        .args(["exec", "-"])
        .write_stdin("x = 3\nprint(x * 2)\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("6"));

    quill(&temp)
        .arg("--cwd")
        .arg(temp.path())
        .args(["exec", "1 / 0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ZeroDivisionError"));
}

#[test]
fn test_run_records_outputs() {
    if !has_python() {
        eprintln!("skipping: no Python interpreter found");
        return;
    }
    let temp = TempDir::new().unwrap();
    let store = quill_sync::NotebookStore::new(temp.path()).unwrap();
    let mut notebook = quill_sync::Notebook::new("calc", "Calc");
    notebook.cells.push(quill_sync::Cell::markdown("# Calc"));
    notebook.cells.push(quill_sync::Cell::code("a = 20"));
    notebook.cells.push(quill_sync::Cell::code("a + 22"));
    store.save("calc", &mut notebook).unwrap();

    quill(&temp)
        .arg("--cwd")
        .arg(temp.path())
        .args(["run", "calc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));

    let saved = store.load("calc").unwrap().unwrap();
    let last = &saved.cells[2];
    assert_eq!(last.output.as_ref().unwrap().content, "42");
    assert_eq!(last.execution_count, Some(2));
    assert_eq!(saved.cells[1].execution_count, Some(1));
}
