//! The synchronous transaction pipeline.

use crate::capture::CaptureFiles;
use crate::config::MailerConfig;
use crate::diag::Severity;
use crate::error::SendError;
use crate::message::Message;
use crate::spawn::{launch_mailer, LaunchedMailer};
use crate::supervise::await_exit;
use crate::transfer::{stream_body, PollBudget, SigpipeGuard};

/// Run one supervised mail transaction and block until its outcome is
/// known.
///
/// The mailer is launched with the message body piped to its stdin; its
/// stdout and stderr are captured to temp files which are deleted when
/// empty and otherwise reported through the configured sink. The call
/// never blocks longer than roughly `config.max_wait` plus the
/// termination grace window, and on return the child has been reaped and
/// every descriptor and temp file released.
///
/// # Errors
///
/// Exactly one of [`SendError`]'s variants describes each non-OK outcome;
/// see [`SendError::code`] for the flat integer contract. All failures
/// except [`SendError::MissingInput`] increment the configuration's
/// failure counter.
pub fn send_mail(config: &MailerConfig, message: &Message) -> Result<(), SendError> {
    if let Err(e) = message.validate() {
        config.sink.emit(Severity::Error, &e.to_string());
        return Err(e);
    }

    let capture = match CaptureFiles::create(config.capture_dir.as_deref()) {
        Ok(capture) => capture,
        Err(e) => {
            config.count_failure();
            config.sink.emit(
                Severity::Error,
                &format!("failed to create capture files for mailer output: {e}"),
            );
            return Err(SendError::CannotCall {
                reason: e.to_string(),
            });
        }
    };

    let result = run_transaction(config, message, &capture);

    // Runs on every exit path, so capture files are never leaked.
    capture.reconcile(config.sink.as_ref());
    result
}

fn run_transaction(
    config: &MailerConfig,
    message: &Message,
    capture: &CaptureFiles,
) -> Result<(), SendError> {
    let LaunchedMailer { child, mut stdin } = launch_mailer(config, message, capture)?;
    let mut budget = PollBudget::new(config.max_wait);

    let transfer = {
        let _sigpipe = SigpipeGuard::install(config.sink.as_ref());
        let status = stream_body(&mut stdin, &message.body, &mut budget, config.sink.as_ref());
        // Close the write end regardless of outcome: end-of-input for a
        // child that is still reading.
        drop(stdin);
        status
    };

    await_exit(child, transfer, &mut budget, config)
}
