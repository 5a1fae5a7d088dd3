//! Launching the external mailer.

use std::io;
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::capture::CaptureFiles;
use crate::config::MailerConfig;
use crate::diag::Severity;
use crate::error::{SendError, EXEC_FAILED_CODE};
use crate::message::Message;
use crate::transfer::set_nonblocking;

/// A launched mailer and the write end of its stdin pipe.
pub(crate) struct LaunchedMailer {
    pub(crate) child: Child,
    pub(crate) stdin: ChildStdin,
}

/// Spawn the mailer as `<mailer> -s <subject> [extra-args...] <recipient>`
/// with stdin wired to a fresh pipe and stdout/stderr to the capture
/// files, and switch the pipe's write end to non-blocking mode.
///
/// A search/permission failure maps to the distinguished launch-failure
/// exit code [`EXEC_FAILED_CODE`]; any other spawn failure is
/// [`SendError::CannotCall`]. Both increment the failure counter and emit
/// one diagnostic. On failure no child is left behind and all
/// already-acquired handles are released.
pub(crate) fn launch_mailer(
    config: &MailerConfig,
    message: &Message,
    capture: &CaptureFiles,
) -> Result<LaunchedMailer, SendError> {
    let sink = config.sink.as_ref();

    let (stdout, stderr) = match capture.handles() {
        Ok(handles) => handles,
        Err(e) => {
            config.count_failure();
            sink.emit(
                Severity::Error,
                &format!("failed to duplicate capture handles for mailer: {e}"),
            );
            return Err(SendError::CannotCall {
                reason: e.to_string(),
            });
        }
    };

    let mut command = Command::new(&config.mailer);
    command
        .arg("-s")
        .arg(&message.subject)
        .args(message.extra_args())
        .arg(&message.recipient)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ) =>
        {
            config.count_failure();
            sink.emit(
                Severity::Error,
                &format!("failed to execute mailer {}: {e}", config.mailer.display()),
            );
            return Err(SendError::MailerExit {
                code: EXEC_FAILED_CODE,
            });
        }
        Err(e) => {
            config.count_failure();
            sink.emit(
                Severity::Error,
                &format!("failed to spawn mailer {}: {e}", config.mailer.display()),
            );
            return Err(SendError::CannotCall {
                reason: e.to_string(),
            });
        }
    };

    let Some(stdin) = child.stdin.take() else {
        // Cannot happen with Stdio::piped; reap rather than leak if it does.
        let _ = child.kill();
        let _ = child.wait();
        config.count_failure();
        sink.emit(Severity::Error, "mailer child has no stdin pipe");
        return Err(SendError::CannotCall {
            reason: "child stdin pipe missing".to_string(),
        });
    };

    tracing::debug!(
        target: "mailwrap",
        pid = child.id(),
        mailer = %config.mailer.display(),
        "launched mailer"
    );

    if let Err(e) = set_nonblocking(&stdin) {
        // Not fatal: a blocking pipe only weakens timeout enforcement.
        sink.emit(
            Severity::Warning,
            &format!("could not make mail pipe non-blocking: {e}"),
        );
    }

    Ok(LaunchedMailer { child, stdin })
}
