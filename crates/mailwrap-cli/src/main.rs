//! Command-line front end: one supervised mail transaction per run.

use std::io::Read as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mailwrap::{send_mail, MailerConfig, Message};

/// Send one message through the configured mail program.
///
/// The body is piped to the mailer's stdin under a hard millisecond
/// budget; a mailer that overruns it is terminated and reaped. The exit
/// status is the mailer's own exit code on mailer failure, 0 on success,
/// and wraps the negative engine codes into the 252-255 range
/// (cannot-call 255, pipe 254, timeout 253, signal 252).
#[derive(Debug, Parser)]
#[command(name = "mailwrap", version, about)]
struct Cli {
    /// Recipient address.
    recipient: String,

    /// Subject line.
    subject: String,

    /// Message body; read from stdin when omitted.
    body: Option<String>,

    /// TOML configuration file (mailer, max_wait, capture_dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mail program to invoke (overrides the config file).
    #[arg(long)]
    mailer: Option<PathBuf>,

    /// Transaction budget in milliseconds (overrides the config file).
    #[arg(long)]
    max_wait_ms: Option<u64>,

    /// Extra mailer argument inserted before the recipient (repeatable),
    /// e.g. `--mailer-arg=-A --mailer-arg=report.pdf` to attach a file
    /// with GNU mailutils.
    #[arg(long = "mailer-arg")]
    mailer_args: Vec<String>,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MailerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MailerConfig::default(),
    };
    if let Some(mailer) = cli.mailer {
        config.mailer = mailer;
    }
    if let Some(ms) = cli.max_wait_ms {
        config.max_wait = Duration::from_millis(ms);
    }

    let body = match cli.body {
        Some(body) => body,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading body from stdin")?;
            buf
        }
    };

    let message = Message::new(cli.recipient, cli.subject, body).args(cli.mailer_args);

    match send_mail(&config, &message) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("mailwrap: {err}");
            #[allow(clippy::cast_sign_loss)]
            Ok(ExitCode::from((err.code() & 0xff) as u8))
        }
    }
}
