//! Capture of the mailer's stdout and stderr.
//!
//! Both streams are redirected into uniquely named temp files instead of
//! being inherited. After the child is gone the files are reconciled:
//! empty captures are deleted silently, non-empty ones are left on disk as
//! diagnostic evidence and reported through the sink.

use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::{Builder, NamedTempFile};

use crate::diag::{DiagnosticSink, Severity};

pub(crate) struct CaptureFiles {
    stdout: NamedTempFile,
    stderr: NamedTempFile,
}

impl CaptureFiles {
    /// Create both capture files in `dir` (system temp dir when `None`).
    ///
    /// # Errors
    ///
    /// Fails if either file cannot be created; nothing is left behind in
    /// that case (a created first file is unlinked on drop).
    pub(crate) fn create(dir: Option<&Path>) -> io::Result<Self> {
        Ok(Self {
            stdout: capture_file("mailwrap-stdout-", dir)?,
            stderr: capture_file("mailwrap-stderr-", dir)?,
        })
    }

    /// Duplicate handles suitable for wiring into the child's stdout and
    /// stderr.
    pub(crate) fn handles(&self) -> io::Result<(File, File)> {
        Ok((
            self.stdout.as_file().try_clone()?,
            self.stderr.as_file().try_clone()?,
        ))
    }

    /// Reconcile after the child has been reaped (or was never launched).
    ///
    /// Empty files are deleted silently. Non-empty files are persisted and
    /// their path and size reported as evidence of unexpected mailer
    /// output. A metadata failure is logged as a warning and the file is
    /// deleted anyway.
    pub(crate) fn reconcile(self, sink: &dyn DiagnosticSink) {
        reconcile_one(self.stdout, "stdout", sink);
        reconcile_one(self.stderr, "stderr", sink);
    }
}

fn capture_file(prefix: &str, dir: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(prefix);
    match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

fn reconcile_one(file: NamedTempFile, stream: &str, sink: &dyn DiagnosticSink) {
    match file.as_file().metadata() {
        Ok(meta) if meta.len() == 0 => {
            // Unlinked when the handle drops.
        }
        Ok(meta) => {
            let len = meta.len();
            match file.keep() {
                Ok((_, path)) => sink.emit(
                    Severity::Error,
                    &format!(
                        "mailer {stream} captured in {} ({len} bytes)",
                        path.display()
                    ),
                ),
                // The temp file is still unlinked via the error's handle.
                Err(e) => sink.emit(
                    Severity::Warning,
                    &format!("could not persist mailer {stream} capture: {e}"),
                ),
            }
        }
        Err(e) => {
            sink.emit(
                Severity::Warning,
                &format!(
                    "could not stat mailer {stream} capture {}: {e}",
                    file.path().display()
                ),
            );
        }
    }
}
