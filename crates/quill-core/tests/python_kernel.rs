//! End-to-end tests against a real Python worker.
//!
//! Each test returns early when no interpreter is available.

use std::sync::Arc;
use std::time::{Duration, Instant};

use quill_core::{Kernel, KernelConfig, OutputKind};
use tempfile::TempDir;

fn kernel() -> Option<(Kernel, TempDir)> {
    let temp = TempDir::new().unwrap();
    let config = KernelConfig::default()
        .with_working_directory(temp.path())
        .with_preload(Vec::new());
    if config.python_executable().is_err() {
        eprintln!("skipping: no Python interpreter found");
        return None;
    }
    Some((Kernel::python(config).unwrap(), temp))
}

#[test]
fn test_missing_working_directory_is_created() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("not/yet/created");
    let config = KernelConfig::default()
        .with_working_directory(&dir)
        .with_preload(Vec::new());
    if config.python_executable().is_err() {
        return;
    }

    let kernel = Kernel::python(config).unwrap();
    assert!(dir.is_dir());
    let expected = dir.canonicalize().unwrap();
    assert_eq!(
        kernel.execute("import os\nos.getcwd()").content(),
        format!("'{}'", expected.display())
    );
}

#[test]
fn test_expression_value() {
    let Some((kernel, _temp)) = kernel() else { return };
    let payload = kernel.execute("2 + 2");
    assert_eq!(payload.kind(), OutputKind::Text);
    assert_eq!(payload.content(), "4");
    assert_eq!(kernel.execution_count(), 1);
}

#[test]
fn test_print_suppresses_value() {
    let Some((kernel, _temp)) = kernel() else { return };
    let payload = kernel.execute("print('hello')\n5");
    assert_eq!(payload.content(), "hello");
}

#[test]
fn test_none_is_not_shown() {
    let Some((kernel, _temp)) = kernel() else { return };
    assert_eq!(kernel.execute("None").content(), "");
    assert_eq!(kernel.execute("'text'").content(), "'text'");
}

#[test]
fn test_state_persists_between_cells() {
    let Some((kernel, _temp)) = kernel() else { return };
    kernel.execute("x = 10\ndef double(n):\n    return n * 2");
    assert_eq!(kernel.execute("double(x)").content(), "20");
}

#[test]
fn test_error_carries_trace() {
    let Some((kernel, _temp)) = kernel() else { return };
    let payload = kernel.execute("1 / 0");
    assert!(payload.is_error());
    assert!(payload.content().contains("ZeroDivisionError"));
    assert!(payload.content().contains("<cell>"));
    assert_eq!(kernel.execution_count(), 0);

    // Streams were restored: later output is captured normally.
    assert_eq!(kernel.execute("print('after')").content(), "after");
}

#[test]
fn test_stderr_is_captured() {
    let Some((kernel, _temp)) = kernel() else { return };
    let payload = kernel.execute("import sys\nsys.stderr.write('careful\\n')\n7");
    assert_eq!(payload.content(), "careful\n7");
}

#[test]
fn test_system_exit_is_an_error() {
    let Some((kernel, _temp)) = kernel() else { return };
    let payload = kernel.execute("raise SystemExit(3)");
    assert!(payload.is_error());
    assert_eq!(kernel.execute("1 + 1").content(), "2");
}

#[test]
fn test_run_merges_bindings() {
    let Some((kernel, temp)) = kernel() else { return };
    std::fs::write(
        temp.path().join("script.py"),
        "value = 42\n__secret__ = 1\nprint('ran')\n",
    )
    .unwrap();

    assert_eq!(kernel.execute("%run script.py").content(), "ran");
    assert_eq!(kernel.execute("value").content(), "42");
    assert!(kernel.execute("__secret__").is_error());

    std::fs::write(temp.path().join("quiet.py"), "quiet = True\n").unwrap();
    let payload = kernel.execute("%run quiet.py");
    assert!(payload.content().starts_with("Executed "));
}

#[test]
fn test_who_whos_and_variables() {
    let Some((kernel, _temp)) = kernel() else { return };
    kernel.execute("import os\nnums = [1, 2, 3]\nname = 'quill'\ndef f():\n    pass");

    assert_eq!(kernel.execute("%who").content(), "f  name  nums  os");
    let whos = kernel.execute("%whos");
    assert!(whos.content().contains("nums       list       [1, 2, 3]"));

    let vars = kernel.list_variables().unwrap();
    let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["nums", "name"]);
    assert_eq!(vars[0].size.as_deref(), Some("3 items"));
    assert_eq!(vars[1].size, None);
}

#[test]
fn test_reset_clears_namespace() {
    let Some((kernel, _temp)) = kernel() else { return };
    kernel.execute("a = 1");
    assert_eq!(kernel.execute("%reset").content(), "Namespace reset.");
    assert!(kernel.list_variables().unwrap().is_empty());
    assert_eq!(kernel.execution_count(), 0);
    assert!(kernel.execute("a").is_error());
}

#[test]
fn test_cwd_and_env_reach_user_code() {
    let Some((kernel, temp)) = kernel() else { return };
    std::fs::create_dir(temp.path().join("data")).unwrap();
    kernel.execute("%cd data");
    kernel.execute("%env QUILL_STAGE=test");

    let cwd = kernel.execute("import os\nos.getcwd()");
    let expected = temp.path().join("data").canonicalize().unwrap();
    assert_eq!(cwd.content(), format!("'{}'", expected.display()));
    assert_eq!(kernel.execute("os.environ['QUILL_STAGE']").content(), "'test'");
}

#[test]
fn test_time_and_timeit() {
    let Some((kernel, _temp)) = kernel() else { return };
    let payload = kernel.execute("%time 6 * 7");
    assert!(payload.content().starts_with("42\nWall time: "));

    let payload = kernel.execute("%timeit sum(range(100))");
    assert!(payload.content().contains("per loop (median ± std. dev. of 5 runs"));

    // timeit assignments do not leak.
    kernel.execute("%timeit leaked = 1");
    assert!(kernel.execute("leaked").is_error());
}

#[cfg(unix)]
#[test]
fn test_interrupt_running_cell() {
    let Some((kernel, _temp)) = kernel() else { return };
    let kernel = Arc::new(kernel);

    let remote = Arc::clone(&kernel);
    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(500));
        remote.request_interrupt();
    });

    let start = Instant::now();
    let payload = kernel.execute("import time\nwhile True:\n    time.sleep(0.01)");
    interrupter.join().unwrap();

    assert!(payload.is_error());
    assert!(payload.content().contains("KeyboardInterrupt"));
    assert!(start.elapsed() < Duration::from_secs(10));
    // The namespace survives.
    assert_eq!(kernel.execute("time.__name__").content(), "'time'");
}

#[test]
fn test_worker_crash_recovers() {
    let Some((kernel, _temp)) = kernel() else { return };
    kernel.execute("x = 1");

    let payload = kernel.execute("import os\nos._exit(1)");
    assert!(payload.is_error());

    // Fresh worker, fresh namespace.
    assert_eq!(kernel.execute("1 + 1").content(), "2");
    assert!(kernel.execute("x").is_error());
}
