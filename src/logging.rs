//! Logging setup
//!
//! Console output goes to stderr (coloured when stderr is a terminal), and an
//! optional plain-text log file is appended under the data directory. The
//! `RUST_LOG` environment variable overrides the requested level.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{WgctlError, WgctlResult};

pub const LOG_FILE: &str = "wgctl.log";

/// Rotate the log file once it grows past this size
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
/// Number of rotated files kept (`wgctl.log.1` .. `wgctl.log.7`)
const LOG_BACKUPS: u32 = 7;

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "debug")
    pub level: String,
    /// Log to stderr
    pub console: bool,
    /// Directory for the log file; `None` disables file logging
    pub log_dir: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            log_dir: None,
        }
    }
}

/// Install the global subscriber. Returns the log file path when file
/// logging is enabled.
pub fn init_logging(options: &LogOptions) -> WgctlResult<Option<PathBuf>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(options.level.to_lowercase())
            .map_err(|e| WgctlError::Config(format!("Invalid log level '{}': {}", options.level, e)))?,
    };

    let console_layer = options.console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .with_target(false)
    });

    let (file_layer, log_path) = match &options.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(LOG_FILE);
            rotate_if_needed(&path, MAX_LOG_BYTES, LOG_BACKUPS)?;
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_line_number(true);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| WgctlError::Config(format!("Failed to install logger: {}", e)))?;

    if let Some(path) = &log_path {
        info!("Logging to {:?}", path);
    }
    Ok(log_path)
}

fn backup_path(path: &Path, index: u32) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

/// Shift `path` to `path.1` (and older backups up by one) once it exceeds
/// `max_bytes`. The oldest backup beyond `backups` is overwritten.
pub fn rotate_if_needed(path: &Path, max_bytes: u64, backups: u32) -> WgctlResult<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(false),
    };
    if size <= max_bytes || backups == 0 {
        return Ok(false);
    }

    for index in (1..backups).rev() {
        let from = backup_path(path, index);
        if from.exists() {
            fs::rename(&from, backup_path(path, index + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))?;
    Ok(true)
}

/// Copy the last `lines` lines of `log_file` to `output`, behind a short
/// header. Returns the number of lines exported.
pub fn export_logs(log_file: &Path, output: &Path, lines: usize) -> WgctlResult<usize> {
    if !log_file.exists() {
        return Err(WgctlError::NotFound(format!("Log file {:?}", log_file)));
    }

    let content = fs::read_to_string(log_file)?;
    let all: Vec<&str> = content.lines().collect();
    let tail = &all[all.len().saturating_sub(lines)..];

    let mut out = fs::File::create(output)?;
    writeln!(out, "wgctl log export")?;
    writeln!(out, "Exported at: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Total lines in log: {}", all.len())?;
    writeln!(out, "Exported lines: {}", tail.len())?;
    writeln!(out, "{}", "=".repeat(80))?;
    for line in tail {
        writeln!(out, "{}", line)?;
    }

    info!("Exported {} log lines to {:?}", tail.len(), output);
    Ok(tail.len())
}
