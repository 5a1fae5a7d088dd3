//! Supervised mail-subprocess transactions.
//!
//! `mailwrap` drives an external mail program (`/bin/mail` by default,
//! invoked as `mailer -s <subject> [extra-args...] <recipient>` with the
//! body on stdin) as one supervised transaction: the body is streamed
//! through a non-blocking pipe under a hard millisecond budget, the
//! mailer's stdout/stderr are captured to temp files, and the outcome is
//! classified deterministically — success, the mailer's own exit code, a
//! launch failure, a pipe failure, a timeout or a signal death. A child
//! that overruns its budget is terminated (SIGTERM, then SIGKILL) and
//! always reaped; no call path leaks processes, descriptors or temp
//! files.
//!
//! # Example
//!
//! ```no_run
//! use mailwrap::{send_mail, MailerConfig, Message};
//!
//! let config = MailerConfig::default();
//! let message = Message::new("ops@example.com", "disk almost full", "97% used on /var");
//! match send_mail(&config, &message) {
//!     Ok(()) => println!("accepted by the mailer"),
//!     Err(err) => eprintln!("send failed: {err} (code {})", err.code()),
//! }
//! ```
//!
//! For concurrent sends, [`SendTask`] runs the same pipeline on a worker
//! thread with non-blocking completion polling and exactly-once result
//! consumption.

#[cfg(not(unix))]
compile_error!("mailwrap drives Unix pipes, signals and process reaping; non-Unix targets are unsupported");

mod capture;
mod config;
mod diag;
mod error;
mod message;
mod send;
mod spawn;
mod supervise;
mod task;
mod transfer;

pub use config::{ConfigError, MailerConfig, DEFAULT_MAILER, DEFAULT_MAX_WAIT};
pub use diag::{DiagnosticSink, MemorySink, NullSink, Severity, TracingSink};
pub use error::{
    SendError, CODE_CANNOT_CALL, CODE_OK, CODE_PIPE, CODE_SIGNAL, CODE_TIMEOUT, EXEC_FAILED_CODE,
};
pub use message::{Message, MAX_EXTRA_ARG_LEN};
pub use send::send_mail;
pub use task::SendTask;
