//! End-to-end transaction tests using shell-script stand-in mailers.

use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mailwrap::{send_mail, MailerConfig, MemorySink, Message, SendError, Severity, EXEC_FAILED_CODE};
use tempfile::TempDir;

/// Write an executable stand-in mailer script.
fn script_mailer(dir: &Path, name: &str, lines: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{lines}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// A config pointing at `mailer`, capturing into `capture_dir`, with a
/// memory sink for diagnostics.
fn test_config(mailer: PathBuf, capture_dir: &Path) -> (MailerConfig, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let mut config = MailerConfig::default();
    config.mailer = mailer;
    config.capture_dir = Some(capture_dir.to_path_buf());
    config.max_wait = Duration::from_secs(5);
    config.sink = sink.clone();
    (config, sink)
}

fn capture_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("mailwrap-"))
        .collect();
    names.sort();
    names
}

#[test]
fn test_body_without_newline_gets_exactly_one_appended() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("delivered");
    let mailer = script_mailer(dir.path(), "echo.sh", &format!("cat > '{}'", out.display()));
    let (config, _sink) = test_config(mailer, dir.path());

    let message = Message::new("ops@example.com", "subject", "no trailing newline");
    send_mail(&config, &message).unwrap();

    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "no trailing newline\n"
    );
    assert_eq!(config.failures(), 0);
}

#[test]
fn test_body_with_newline_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("delivered");
    let mailer = script_mailer(dir.path(), "echo.sh", &format!("cat > '{}'", out.display()));
    let (config, sink) = test_config(mailer, dir.path());

    let message = Message::new("ops@example.com", "subject", "already terminated\n");
    send_mail(&config, &message).unwrap();

    assert_eq!(fs::read_to_string(&out).unwrap(), "already terminated\n");
    assert_eq!(config.failures(), 0);
    assert!(sink.entries().is_empty());
    // Both captures were empty and must be gone.
    assert!(capture_files(dir.path()).is_empty());
}

#[test]
fn test_large_body_is_delivered_intact() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("delivered");
    let mailer = script_mailer(dir.path(), "echo.sh", &format!("cat > '{}'", out.display()));
    let (mut config, _sink) = test_config(mailer, dir.path());
    config.max_wait = Duration::from_secs(30);

    // Well past the pipe buffer size, so the would-block retry path is
    // exercised.
    let line = "the quick brown fox jumps over the lazy dog 0123456789\n";
    let body: String = line.repeat(30_000); // ~1.7 MB
    let message = Message::new("ops@example.com", "bulk", body.clone());
    send_mail(&config, &message).unwrap();

    assert_eq!(fs::read_to_string(&out).unwrap(), body);
    assert_eq!(config.failures(), 0);
}

#[test]
fn test_argv_order_is_subject_extras_recipient() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("argv");
    let mailer = script_mailer(
        dir.path(),
        "argv.sh",
        &format!("printf '%s\\n' \"$@\" > '{}'\ncat > /dev/null", out.display()),
    );
    let (config, _sink) = test_config(mailer, dir.path());

    let message = Message::new("root@example.com", "weekly report", "see attachment")
        .arg("-A")
        .arg("report.pdf");
    send_mail(&config, &message).unwrap();

    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "-s\nweekly report\n-A\nreport.pdf\nroot@example.com\n"
    );
}

#[test]
fn test_mailer_exit_code_is_surfaced_verbatim() {
    let dir = TempDir::new().unwrap();
    let (config, sink) = test_config(PathBuf::from("/bin/false"), dir.path());

    let err = send_mail(&config, &Message::new("r", "s", "b")).unwrap_err();
    assert!(matches!(err, SendError::MailerExit { code: 1 }));
    assert_eq!(err.code(), 1);
    assert_eq!(config.failures(), 1);
    assert_eq!(sink.count(Severity::Error), 1);
}

#[test]
fn test_unexecutable_mailer_is_the_distinguished_code() {
    let dir = TempDir::new().unwrap();
    let (config, sink) = test_config(PathBuf::from("/nonexistent/mailer"), dir.path());

    let err = send_mail(&config, &Message::new("r", "s", "b")).unwrap_err();
    assert!(err.is_exec_failure());
    assert_eq!(err.code(), EXEC_FAILED_CODE);
    assert_eq!(config.failures(), 1);
    assert_eq!(sink.count(Severity::Error), 1);
    // Nothing launched, nothing captured.
    assert!(capture_files(dir.path()).is_empty());
}

#[test]
fn test_overrunning_mailer_times_out_and_is_reaped() {
    let dir = TempDir::new().unwrap();
    let mailer = script_mailer(dir.path(), "slow.sh", "cat > /dev/null\nexec sleep 10");
    let (mut config, _sink) = test_config(mailer, dir.path());
    config.max_wait = Duration::from_millis(150);

    let started = Instant::now();
    let err = send_mail(&config, &Message::new("r", "s", "b")).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, SendError::Timeout { .. }));
    assert_eq!(err.code(), -3);
    assert_eq!(config.failures(), 1);
    // Far below the child's 10 s sleep: it was terminated and reaped, and
    // the escalation grace window is budget + 100 ms.
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    assert!(capture_files(dir.path()).is_empty());
}

#[test]
fn test_zero_budget_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let mailer = script_mailer(dir.path(), "slow.sh", "exec sleep 5");
    let (mut config, _sink) = test_config(mailer, dir.path());
    config.max_wait = Duration::ZERO;

    let started = Instant::now();
    let err = send_mail(&config, &Message::new("r", "s", "b")).unwrap_err();

    assert!(matches!(
        err,
        SendError::Timeout { .. } | SendError::CannotCall { .. }
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_early_exit_is_never_reported_ok() {
    let dir = TempDir::new().unwrap();
    let mailer = script_mailer(dir.path(), "bail.sh", "exit 3");
    let (config, _sink) = test_config(mailer, dir.path());

    // Large enough to overflow the pipe buffer, so the write loop is
    // still running when the child abandons its stdin.
    let body = "x".repeat(512 * 1024);
    let err = send_mail(&config, &Message::new("r", "s", body)).unwrap_err();

    // Either the broken pipe or the child's own exit code wins the race,
    // never success.
    assert!(matches!(
        err,
        SendError::Pipe { .. } | SendError::MailerExit { code: 3 }
    ));
    assert!(config.failures() >= 1);
}

#[test]
fn test_unexpected_mailer_output_is_kept_and_reported() {
    let scripts = TempDir::new().unwrap();
    let captures = TempDir::new().unwrap();
    let mailer = script_mailer(
        scripts.path(),
        "noisy.sh",
        "echo unexpected-noise\ncat > /dev/null",
    );
    let (config, sink) = test_config(mailer, captures.path());

    send_mail(&config, &Message::new("r", "s", "b")).unwrap();

    let kept = capture_files(captures.path());
    assert_eq!(kept.len(), 1);
    assert!(kept[0].starts_with("mailwrap-stdout-"));

    let content = fs::read_to_string(captures.path().join(&kept[0])).unwrap();
    assert_eq!(content, "unexpected-noise\n");

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, Severity::Error);
    assert!(entries[0].1.contains("stdout captured in"));
}

#[test]
fn test_empty_inputs_rejected_before_any_resources() {
    let dir = TempDir::new().unwrap();
    let (config, sink) = test_config(PathBuf::from("/bin/false"), dir.path());

    let err = send_mail(&config, &Message::new("", "s", "b")).unwrap_err();
    assert!(matches!(err, SendError::MissingInput { field: "recipient" }));

    // Input errors do not count as transaction failures and acquire
    // nothing.
    assert_eq!(config.failures(), 0);
    assert!(capture_files(dir.path()).is_empty());
    assert_eq!(sink.count(Severity::Error), 1);
}

#[test]
fn test_failure_counter_accumulates_across_transactions() {
    let dir = TempDir::new().unwrap();
    let (config, _sink) = test_config(PathBuf::from("/bin/false"), dir.path());

    for _ in 0..3 {
        let _ = send_mail(&config, &Message::new("r", "s", "b"));
    }
    assert_eq!(config.failures(), 3);

    config.reset_failures();
    assert_eq!(config.failures(), 0);
}
