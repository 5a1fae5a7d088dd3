//! Budgeted non-blocking delivery of the message body.
//!
//! The body is streamed into the child's stdin through a non-blocking
//! pipe. Would-block conditions cost one 1 ms tick from the shared poll
//! budget; broken pipes and other write errors end the transfer without
//! being immediately fatal (the supervisor still asks the child for its
//! real exit status). `SIGPIPE` is suppressed for the duration of the
//! transfer by a scoped guard so an early-exiting child cannot kill the
//! calling process.

use std::io;
use std::io::Write as _;
use std::os::fd::AsRawFd as _;
use std::process::ChildStdin;
use std::thread;
use std::time::Duration;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::diag::{DiagnosticSink, Severity};

/// Interval of one poll tick.
pub(crate) const POLL_TICK: Duration = Duration::from_millis(1);

/// Extra grace ticks granted after SIGTERM before escalating to SIGKILL.
pub(crate) const GRACE_EXTRA_TICKS: u64 = 100;

/// Millisecond poll budget shared by the transfer and reap phases.
///
/// Each tick sleeps ~1 ms and is charged against the budget. The tick
/// count carries over from body transfer into exit polling rather than
/// being reset, so the whole transaction observes one wall-clock ceiling.
#[derive(Debug)]
pub(crate) struct PollBudget {
    ticks: u64,
    max: u64,
}

impl PollBudget {
    pub(crate) fn new(max_wait: Duration) -> Self {
        Self {
            ticks: 0,
            max: u64::try_from(max_wait.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub(crate) const fn exhausted(&self) -> bool {
        self.ticks >= self.max
    }

    /// Ticks consumed so far, in milliseconds.
    pub(crate) const fn consumed(&self) -> u64 {
        self.ticks
    }

    /// Sleep one tick and charge it against the budget.
    pub(crate) fn tick(&mut self) {
        thread::sleep(POLL_TICK);
        self.ticks += 1;
    }

    /// Tick ceiling for the termination escalation: the full budget plus
    /// [`GRACE_EXTRA_TICKS`].
    pub(crate) const fn grace_limit(&self) -> u64 {
        self.max.saturating_add(GRACE_EXTRA_TICKS)
    }
}

/// Scoped suppression of `SIGPIPE`.
///
/// With the default disposition a write to a pipe whose reader has exited
/// kills the writing process; under the guard it surfaces as a
/// `BrokenPipe` write error instead. The previous disposition is restored
/// when the guard drops, on every exit path.
pub(crate) struct SigpipeGuard {
    previous: Option<SigAction>,
}

impl SigpipeGuard {
    /// Ignore `SIGPIPE`, remembering the previous disposition.
    ///
    /// Installation failure is reported as a warning; the transfer then
    /// proceeds relying on the process-wide default (which in Rust
    /// binaries is already "ignore").
    pub(crate) fn install(sink: &dyn DiagnosticSink) -> Self {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: SIG_IGN runs no handler code; swapping it in and out for
        // SIGPIPE upholds all sigaction invariants.
        match unsafe { sigaction(Signal::SIGPIPE, &ignore) } {
            Ok(previous) => Self {
                previous: Some(previous),
            },
            Err(e) => {
                sink.emit(
                    Severity::Warning,
                    &format!("could not suppress SIGPIPE for body transfer: {e}"),
                );
                Self { previous: None }
            }
        }
    }
}

impl Drop for SigpipeGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // SAFETY: restores the disposition captured by `install`.
            let _ = unsafe { sigaction(Signal::SIGPIPE, &previous) };
        }
    }
}

/// Switch the pipe's write end to non-blocking mode.
pub(crate) fn set_nonblocking(stdin: &ChildStdin) -> nix::Result<()> {
    let fd = stdin.as_raw_fd();
    let flags = OFlag::from_bits_retain(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Result of one body transfer attempt.
#[derive(Debug)]
pub(crate) enum TransferStatus {
    /// Every byte, including the normalized trailing newline, was
    /// delivered.
    Complete,
    /// A write failed; `BrokenPipe` when the child closed its input early.
    WriteFailed(io::Error),
    /// The poll budget ran out before all bytes were delivered.
    BudgetExhausted,
}

/// Stream `body` into the child's stdin under the poll budget.
///
/// The outgoing buffer is the body plus one appended newline when the
/// body does not already end in one, so the normalization is subject to
/// the same budget and error handling as the rest of the stream.
pub(crate) fn stream_body(
    stdin: &mut ChildStdin,
    body: &str,
    budget: &mut PollBudget,
    sink: &dyn DiagnosticSink,
) -> TransferStatus {
    let mut buf = Vec::with_capacity(body.len() + 1);
    buf.extend_from_slice(body.as_bytes());
    if !body.ends_with('\n') {
        buf.push(b'\n');
    }

    let total = buf.len();
    let mut sent = 0usize;
    while sent < total {
        if budget.exhausted() {
            sink.emit(
                Severity::Error,
                &format!(
                    "timeout while piping mail body, only {sent} of {total} bytes sent after {} ms",
                    budget.consumed()
                ),
            );
            return TransferStatus::BudgetExhausted;
        }
        match stdin.write(&buf[sent..]) {
            Ok(0) => {
                sink.emit(
                    Severity::Error,
                    "mailer stopped accepting input before the body was delivered",
                );
                return TransferStatus::WriteFailed(io::Error::from(io::ErrorKind::WriteZero));
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => budget.tick(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                sink.emit(
                    Severity::Error,
                    "broken pipe while sending mail body (mailer may have exited early)",
                );
                return TransferStatus::WriteFailed(e);
            }
            Err(e) => {
                sink.emit(Severity::Error, &format!("failed to pipe mail body: {e}"));
                return TransferStatus::WriteFailed(e);
            }
        }
    }
    TransferStatus::Complete
}
