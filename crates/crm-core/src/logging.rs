//! Tracing setup.
//!
//! Logs go to a file under `CRM_HOME` so they never mix with command output.
//! `CRM_LOG` overrides the configured filter.

use std::fs;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;

pub const LOG_ENV: &str = "CRM_LOG";

/// Picks the filter directive: a non-blank env value wins over the config.
pub fn resolve_filter(env: Option<&str>, configured: &str) -> String {
    env.map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| Some(configured.trim()).filter(|value| !value.is_empty()))
        .unwrap_or("warn")
        .to_string()
}

/// Installs the global subscriber.
///
/// The returned guard flushes buffered lines on drop; keep it alive for the
/// lifetime of the process.
///
/// # Errors
/// Returns an error if the log directory cannot be created or the filter is
/// malformed.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
    let path = config.file_path();
    let dir = path
        .parent()
        .context("log file path has no parent directory")?;
    fs::create_dir_all(dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;
    let file_name = path
        .file_name()
        .context("log file path has no file name")?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env = std::env::var(LOG_ENV).ok();
    let directive = resolve_filter(env.as_deref(), &config.level);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false);

    // A subscriber may already be installed (tests, embedding); keep it.
    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }

    tracing::debug!(file = %path.display(), filter = %directive, "logging initialized");
    Ok(guard)
}
