//! Mailer configuration.
//!
//! A [`MailerConfig`] is owned by the caller, reusable across any number of
//! transactions, and cheap to clone: clones share the failure counter and
//! the diagnostic sink. The serializable fields (`mailer`, `max_wait`,
//! `capture_dir`) can be loaded from a TOML document.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diag::{DiagnosticSink, TracingSink};

/// Default mail program.
pub const DEFAULT_MAILER: &str = "/bin/mail";

/// Default wall-clock budget for one transaction (transfer plus wait).
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(900);

/// Configuration for mail transactions.
///
/// The failure counter accumulates across every transaction run with this
/// configuration (or a clone of it) until [`MailerConfig::reset_failures`]
/// is called.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Mail program to invoke as `mailer -s <subject> [args...] <recipient>`
    /// with the message body supplied on stdin.
    #[serde(default = "default_mailer")]
    pub mailer: PathBuf,

    /// Maximum wall-clock time for one transaction, at millisecond
    /// granularity. A child that overruns it is terminated and reaped.
    #[serde(default = "default_max_wait", with = "humantime_serde")]
    pub max_wait: Duration,

    /// Directory for the stdout/stderr capture files. The system temp
    /// directory is used when unset.
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,

    /// Count of failed transactions, shared across clones.
    #[serde(skip, default = "default_failures")]
    failures: Arc<AtomicU32>,

    /// Destination for warning/error diagnostics.
    #[serde(skip, default = "default_sink")]
    pub sink: Arc<dyn DiagnosticSink>,
}

fn default_mailer() -> PathBuf {
    PathBuf::from(DEFAULT_MAILER)
}

const fn default_max_wait() -> Duration {
    DEFAULT_MAX_WAIT
}

fn default_failures() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

fn default_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(TracingSink)
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            mailer: default_mailer(),
            max_wait: DEFAULT_MAX_WAIT,
            capture_dir: None,
            failures: default_failures(),
            sink: default_sink(),
        }
    }
}

impl fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerConfig")
            .field("mailer", &self.mailer)
            .field("max_wait", &self.max_wait)
            .field("capture_dir", &self.capture_dir)
            .field("failures", &self.failures())
            .finish_non_exhaustive()
    }
}

impl MailerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Number of failed transactions recorded so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Reset the failure counter to zero.
    pub fn reset_failures(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn count_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
