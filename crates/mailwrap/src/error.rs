//! Transaction outcome classification.
//!
//! Every transaction produces exactly one outcome: `Ok(())` for a clean
//! zero exit, or one [`SendError`] describing why delivery cannot be
//! confirmed. [`SendError::code`] exposes the flat integer contract for
//! callers that need a process exit status or a wire-friendly code.

use std::time::Duration;

use thiserror::Error;

/// Exit code reserved to mean "the mailer executable itself could not be
/// launched", as opposed to the mailer running and failing. Matches the
/// shell convention for "command not found".
pub const EXEC_FAILED_CODE: i32 = 127;

/// Raw code: transaction succeeded.
pub const CODE_OK: i32 = 0;
/// Raw code: the mailer process could not be created or waited on.
pub const CODE_CANNOT_CALL: i32 = -1;
/// Raw code: the body could not be delivered over the stdin pipe.
pub const CODE_PIPE: i32 = -2;
/// Raw code: the mailer did not finish within the configured budget.
pub const CODE_TIMEOUT: i32 = -3;
/// Raw code: the mailer died from a signal or terminated abnormally.
pub const CODE_SIGNAL: i32 = -4;

/// Why a mail transaction did not confirm delivery.
#[derive(Debug, Error)]
pub enum SendError {
    /// A required input field was empty. Rejected before any resource is
    /// acquired and without touching the failure counter.
    #[error("empty {field}: recipient, subject and body must be non-empty")]
    MissingInput {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The mailer process could not be created, or the wait primitive
    /// failed and left the child's state unknown.
    #[error("mailer could not be invoked: {reason}")]
    CannotCall {
        /// Human-readable description of the failing step.
        reason: String,
    },

    /// Delivering the body over the stdin pipe failed, typically because
    /// the mailer closed its input early.
    #[error("failed to deliver body to mailer: {source}")]
    Pipe {
        /// The write error that interrupted the transfer.
        #[source]
        source: std::io::Error,
    },

    /// The mailer did not finish within the configured budget; it has been
    /// terminated and reaped.
    #[error("mailer did not finish within {waited:?}")]
    Timeout {
        /// Wall-clock time consumed before giving up.
        waited: Duration,
    },

    /// The mailer was terminated by a signal (or ended abnormally, in
    /// which case `signal` is `-1`).
    #[error("mailer terminated by signal {signal}")]
    Signal {
        /// Signal number that killed the child.
        signal: i32,
    },

    /// The mailer ran and exited nonzero; the code is surfaced verbatim.
    /// [`EXEC_FAILED_CODE`] means the executable could not be launched.
    #[error("mailer exited with code {code}")]
    MailerExit {
        /// The mailer's own exit code.
        code: i32,
    },
}

impl SendError {
    /// Flat integer code for this outcome: a positive mailer exit code, or
    /// one of the negative `CODE_*` engine codes. `MissingInput` maps to
    /// [`CODE_CANNOT_CALL`].
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::MissingInput { .. } | Self::CannotCall { .. } => CODE_CANNOT_CALL,
            Self::Pipe { .. } => CODE_PIPE,
            Self::Timeout { .. } => CODE_TIMEOUT,
            Self::Signal { .. } => CODE_SIGNAL,
            Self::MailerExit { code } => *code,
        }
    }

    /// True when the mailer executable itself could not be launched.
    #[must_use]
    pub const fn is_exec_failure(&self) -> bool {
        matches!(
            self,
            Self::MailerExit {
                code: EXEC_FAILED_CODE
            }
        )
    }
}
