//! Timeout supervision, termination escalation and exit classification.
//!
//! After the body transfer the supervisor polls for child termination at
//! ~1 ms intervals against the budget carried over from the transfer. A
//! child that overruns the budget (or broke the pipe and is still alive)
//! is walked through the graceful-then-forceful termination sequence and
//! is always reaped, so no transaction can leave a zombie behind.

use std::os::unix::process::ExitStatusExt as _;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::config::MailerConfig;
use crate::diag::Severity;
use crate::error::SendError;
use crate::transfer::{PollBudget, TransferStatus, POLL_TICK};

/// Wait for the child within the remaining budget and classify its exit.
///
/// The child is consumed: on every path it has either been reaped or (on
/// a wait failure) its state is unknown and no termination is attempted.
pub(crate) fn await_exit(
    mut child: Child,
    transfer: TransferStatus,
    budget: &mut PollBudget,
    config: &MailerConfig,
) -> Result<(), SendError> {
    match transfer {
        TransferStatus::WriteFailed(source) => {
            late_exit_or_escalate(&mut child, budget, config, SendError::Pipe { source })
        }
        TransferStatus::BudgetExhausted => late_exit_or_escalate(
            &mut child,
            budget,
            config,
            SendError::Timeout {
                waited: Duration::from_millis(budget.consumed()),
            },
        ),
        TransferStatus::Complete => poll_until_exit(&mut child, budget, config),
    }
}

/// The transfer ended badly: give the child one immediate chance to
/// explain itself. An already-reaped exit status is authoritative;
/// otherwise escalate to termination and report `failure`.
fn late_exit_or_escalate(
    child: &mut Child,
    budget: &mut PollBudget,
    config: &MailerConfig,
    failure: SendError,
) -> Result<(), SendError> {
    thread::sleep(POLL_TICK);
    match child.try_wait() {
        Ok(Some(status)) => decode_exit(status, config),
        Ok(None) => {
            terminate_gracefully(child, budget, config);
            config.count_failure();
            Err(failure)
        }
        Err(e) => wait_failed(e, config),
    }
}

/// Poll for exit at ~1 ms until the child finishes or the budget runs out.
fn poll_until_exit(
    child: &mut Child,
    budget: &mut PollBudget,
    config: &MailerConfig,
) -> Result<(), SendError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return decode_exit(status, config),
            Ok(None) => {
                if budget.exhausted() {
                    config.sink.emit(
                        Severity::Error,
                        &format!(
                            "timeout waiting for mailer to finish, waited {} ms",
                            budget.consumed()
                        ),
                    );
                    terminate_gracefully(child, budget, config);
                    config.count_failure();
                    return Err(SendError::Timeout {
                        waited: Duration::from_millis(budget.consumed()),
                    });
                }
                budget.tick();
            }
            Err(e) => return wait_failed(e, config),
        }
    }
}

/// A wait primitive failure leaves the child's state unknown: record the
/// failure and do not attempt termination.
fn wait_failed(e: std::io::Error, config: &MailerConfig) -> Result<(), SendError> {
    config.count_failure();
    config
        .sink
        .emit(Severity::Error, &format!("failed to wait for mailer: {e}"));
    Err(SendError::CannotCall {
        reason: format!("wait failed: {e}"),
    })
}

/// SIGTERM, bounded grace polling, then SIGKILL and a blocking reap.
///
/// Continues charging the shared budget; the grace window is the full
/// budget plus a small constant. Returns only once the child has been
/// reaped (best-effort if the wait primitive errors mid-escalation).
fn terminate_gracefully(child: &mut Child, budget: &mut PollBudget, config: &MailerConfig) {
    let sink = config.sink.as_ref();
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid::from_raw(child.id() as i32);

    sink.emit(Severity::Error, &format!("terminating mailer, pid {pid}"));
    if let Err(e) = kill(pid, Signal::SIGTERM) {
        sink.emit(
            Severity::Warning,
            &format!("failed to signal mailer pid {pid}: {e}"),
        );
    }

    let grace_limit = budget.grace_limit();
    while budget.consumed() < grace_limit {
        budget.tick();
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(_) => break,
        }
    }

    // Still running (or the wait went sideways): force kill. The blocking
    // wait is expected to return almost immediately after SIGKILL.
    sink.emit(Severity::Error, &format!("killing mailer, pid {pid}"));
    let _ = child.kill();
    let _ = child.wait();
}

/// Classify a reaped exit status.
///
/// Zero is success. A nonzero exit code is surfaced verbatim (including
/// the distinguished launch-failure code); signal death and abnormal
/// termination map to [`SendError::Signal`]. Every non-OK classification
/// increments the failure counter and emits one diagnostic.
pub(crate) fn decode_exit(status: ExitStatus, config: &MailerConfig) -> Result<(), SendError> {
    let sink = config.sink.as_ref();
    if let Some(code) = status.code() {
        if code == 0 {
            return Ok(());
        }
        config.count_failure();
        sink.emit(Severity::Error, &format!("mailer exited with code {code}"));
        return Err(SendError::MailerExit { code });
    }
    config.count_failure();
    match status.signal() {
        Some(signal) => {
            sink.emit(
                Severity::Error,
                &format!("mailer terminated by signal {signal}"),
            );
            Err(SendError::Signal { signal })
        }
        None => {
            sink.emit(Severity::Error, "mailer terminated abnormally");
            Err(SendError::Signal { signal: -1 })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::sync::Arc;

    use super::*;
    use crate::diag::MemorySink;

    fn test_config() -> (MailerConfig, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let mut config = MailerConfig::default();
        config.sink = sink.clone();
        (config, sink)
    }

    fn run(cmd: &str) -> ExitStatus {
        Command::new("sh").arg("-c").arg(cmd).status().unwrap()
    }

    #[test]
    fn test_decode_clean_exit() {
        let (config, sink) = test_config();
        assert!(decode_exit(run("exit 0"), &config).is_ok());
        assert_eq!(config.failures(), 0);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_decode_nonzero_exit_is_verbatim() {
        let (config, sink) = test_config();
        let err = decode_exit(run("exit 42"), &config).unwrap_err();
        assert!(matches!(err, SendError::MailerExit { code: 42 }));
        assert_eq!(config.failures(), 1);
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[test]
    fn test_decode_signal_death() {
        let (config, sink) = test_config();
        let err = decode_exit(run("kill -9 $$"), &config).unwrap_err();
        assert!(matches!(err, SendError::Signal { signal: 9 }));
        assert_eq!(config.failures(), 1);
        assert_eq!(sink.count(Severity::Error), 1);
    }
}
