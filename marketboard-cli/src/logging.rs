//! Append-only file logging.
//!
//! Each line is `<RFC 3339 UTC> | <LEVEL> | <target> | <message>`. The level
//! defaults to info and can be overridden with `RUST_LOG`.

use anyhow::{Context as _, Result};
use chrono::{SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Install the global logger, appending to `path`.
pub fn init_logger(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {} | {} | {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
        .context("install logger")?;
    Ok(())
}

/// Fallback when the log file cannot be opened: log to stderr.
pub fn init_stderr_logger() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .try_init();
}
