//! End-to-end runs through `Executor` against small shell-script tools.
#![cfg(unix)]
#![allow(unsafe_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;
use ukiryu::{
    Config, DiscoverySource, Error, Executor, ShellKind, ToolDefinition, ToolInvocation,
};

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn executor_for(dir: &TempDir) -> Executor {
    Executor::new(Config {
        search_paths: vec![dir.path().to_path_buf()],
        detect_aliases: false,
        ..Config::default()
    })
}

/// True while `pid` exists and has not exited. A zombie waiting to be
/// reaped counts as exited.
fn is_running(pid: libc::pid_t) -> bool {
    if unsafe { libc::kill(pid, 0) } == -1 {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z')),
        Err(_) => !cfg!(target_os = "linux"),
    }
}

fn tool(value: serde_json::Value) -> ToolDefinition {
    serde_json::from_value(value).expect("tool definition")
}

#[tokio::test]
async fn runs_a_tool_found_on_the_search_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    script(dir.path(), "ukiryu-echo-args", r#"for arg in "$@"; do printf '[%s]\n' "$arg"; done"#);
    let tool = tool(json!({
        "name": "echo-args",
        "executable": "ukiryu-echo-args",
        "commands": [{
            "name": "print",
            "options": [{"name": "mode", "cli": "--mode"}],
            "flags": [{"name": "all", "cli": "-a"}],
            "arguments": [{"name": "text", "position": "last"}]
        }]
    }));

    let executor = executor_for(&dir);
    let result = executor
        .run(
            ToolInvocation::new(&tool, "print")
                .shell(ShellKind::Bash)
                .param("mode", "fast lane")
                .param("all", true)
                .param("text", "it's here"),
        )
        .await
        .expect("run");

    assert_eq!(result.exit_status, 0);
    assert_eq!(result.stdout, "[--mode=fast lane]\n[-a]\n[it's here]\n");
    assert_eq!(result.args, vec!["--mode=fast lane", "-a", "it's here"]);
    assert!(result.command_line.ends_with(r"'-a' 'it'\''s here'"));
    assert!(result.finished_at >= result.started_at);

    let info = executor
        .locate(&tool, ukiryu::Platform::current(), executor.shell(Some(ShellKind::Bash)).expect("bash").as_ref())
        .await
        .expect("cached lookup");
    assert_eq!(info.source, DiscoverySource::Path);
    assert!(executor.locator().cache_stats().hits >= 1);
}

#[tokio::test]
async fn non_zero_exit_is_a_result_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    script(dir.path(), "ukiryu-fail", "echo broken >&2\nexit 4");
    let tool = tool(json!({
        "name": "fail",
        "executable": "ukiryu-fail",
        "commands": [{"name": "run"}]
    }));

    let result = executor_for(&dir)
        .run(ToolInvocation::new(&tool, "run").shell(ShellKind::Sh))
        .await
        .expect("result");
    assert_eq!(result.exit_status, 4);
    assert_eq!(result.stderr.trim(), "broken");
    assert!(!result.success());
}

#[tokio::test]
async fn timeouts_always_propagate() {
    let dir = tempfile::tempdir().expect("tempdir");
    script(dir.path(), "ukiryu-slow", "sleep 5");
    let tool = tool(json!({
        "name": "slow",
        "executable": "ukiryu-slow",
        "commands": [{"name": "run"}]
    }));

    let started = Instant::now();
    let err = executor_for(&dir)
        .run(
            ToolInvocation::new(&tool, "run")
                .shell(ShellKind::Bash)
                .timeout(Duration::from_secs(1))
                .allow_failure(),
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    match err {
        Error::Timeout { executable, timeout, .. } => {
            assert!(executable.ends_with("ukiryu-slow"));
            assert_eq!(timeout, Duration::from_secs(1));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn timed_out_tools_leave_no_orphans() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("worker.pid");
    script(
        dir.path(),
        "ukiryu-spawner",
        r#"sleep 30 & echo $! > "$PIDFILE"; wait"#,
    );
    let tool = tool(json!({
        "name": "spawner",
        "executable": "ukiryu-spawner",
        "commands": [{"name": "run"}]
    }));

    let err = executor_for(&dir)
        .run(
            ToolInvocation::new(&tool, "run")
                .shell(ShellKind::Bash)
                .env("PIDFILE", pid_file.display().to_string())
                .timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");

    let pid: libc::pid_t = std::fs::read_to_string(&pid_file)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid");
    let deadline = Instant::now() + Duration::from_secs(3);
    while is_running(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!is_running(pid), "background sleep {pid} survived the timeout");
}

#[tokio::test]
async fn env_vars_stdin_and_headless_defaults_reach_the_child() {
    let dir = tempfile::tempdir().expect("tempdir");
    script(
        dir.path(),
        "ukiryu-env",
        r#"printf '%s|%s|%s|' "$UKIRYU_LEVEL" "$UKIRYU_EXTRA" "${DISPLAY-unset}"; cat"#,
    );
    let tool = tool(json!({
        "name": "env",
        "executable": "ukiryu-env",
        "commands": [{
            "name": "show",
            "options": [{"name": "level", "cli": "--level"}],
            "env_vars": [
                {"name": "UKIRYU_LEVEL", "from_param": "level"},
                {"name": "UKIRYU_WINDOWS_ONLY", "value": "1", "platforms": ["windows"]}
            ]
        }]
    }));

    let result = executor_for(&dir)
        .run(
            ToolInvocation::new(&tool, "show")
                .shell(ShellKind::Bash)
                .platform(ukiryu::Platform::Linux)
                .param("level", "3")
                .env("UKIRYU_EXTRA", "caller")
                .stdin("piped input"),
        )
        .await
        .expect("run");

    assert_eq!(result.stdout, "3|caller||piped input");
}

#[tokio::test]
async fn version_detection_and_requirement_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = script(dir.path(), "ukiryu-versioned", "echo 'versioned tool 10.2.1 (build 7)' >&2");
    let mut tool = tool(json!({
        "name": "versioned",
        "executable": "ukiryu-versioned",
        "version_detection": {"command": "--version", "pattern": "tool ([0-9.]+)"},
        "version_requirement": ">= 9.5, < 11"
    }));

    let executor = executor_for(&dir);
    let report = executor.check_version(&tool, &path).await;
    assert_eq!(report.version.as_deref(), Some("10.2.1"));
    assert!(report.is_compatible());

    tool.version_requirement = Some("~> 9.5".into());
    let report = executor.check_version(&tool, &path).await;
    assert!(!report.is_compatible());
}

#[test]
#[serial]
fn configuration_reads_ukiryu_environment() {
    // SAFETY: serialised with other environment-mutating tests.
    unsafe {
        std::env::set_var("UKIRYU_TIMEOUT", "7");
        std::env::set_var("UKIRYU_SHELL", "dash");
    }
    let config = Config::from_env();
    unsafe {
        std::env::remove_var("UKIRYU_TIMEOUT");
        std::env::remove_var("UKIRYU_SHELL");
    }

    let config = config.expect("config");
    assert_eq!(config.timeout(), Some(Duration::from_secs(7)));
    assert_eq!(config.shell, Some(ShellKind::Dash));
}

#[test]
#[serial]
fn shell_detection_follows_the_shell_variable() {
    let previous = std::env::var("SHELL").ok();
    // SAFETY: serialised with other environment-mutating tests.
    unsafe { std::env::set_var("SHELL", "/usr/bin/fish") };
    let detected = Executor::new(Config::default()).shell(None).expect("shell").kind();
    unsafe {
        match previous {
            Some(value) => std::env::set_var("SHELL", value),
            None => std::env::remove_var("SHELL"),
        }
    }
    assert_eq!(detected, ShellKind::Fish);
}
