//! Message inputs for one transaction.

use crate::error::SendError;

/// Upper bound, in bytes, on each extra mailer argument.
pub const MAX_EXTRA_ARG_LEN: usize = 4096;

/// One message to hand to the mailer.
///
/// Extra arguments are inserted between the subject and the recipient in
/// the mailer's argument vector, in the order they were added; with GNU
/// mailutils, `.arg("-A").arg("report.pdf")` attaches a file.
#[derive(Debug, Clone)]
pub struct Message {
    /// Recipient address (must be non-empty).
    pub recipient: String,
    /// Subject line (must be non-empty).
    pub subject: String,
    /// Message body (must be non-empty; a trailing newline is added on
    /// delivery if absent).
    pub body: String,
    extra_args: Vec<String>,
}

impl Message {
    /// Create a message with no extra mailer arguments.
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append one extra mailer argument, truncated to [`MAX_EXTRA_ARG_LEN`]
    /// bytes on a UTF-8 boundary.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args
            .push(truncate_utf8_safe(arg.into(), MAX_EXTRA_ARG_LEN));
        self
    }

    /// Append several extra mailer arguments.
    #[must_use]
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().fold(self, Self::arg)
    }

    pub(crate) fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// Reject empty fields before any resource is acquired.
    pub(crate) fn validate(&self) -> Result<(), SendError> {
        if self.recipient.is_empty() {
            return Err(SendError::MissingInput { field: "recipient" });
        }
        if self.subject.is_empty() {
            return Err(SendError::MissingInput { field: "subject" });
        }
        if self.body.is_empty() {
            return Err(SendError::MissingInput { field: "body" });
        }
        Ok(())
    }
}

/// Truncate `s` to at most `max` bytes without splitting a character.
fn truncate_utf8_safe(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
