use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;

/// Initialize file-backed logging when enabled.
///
/// stdout carries the protocol, so log output goes to
/// `sqltools-<pid>.log` under the given directory (the system temp
/// directory when none is given). Returns the log file path, or `None`
/// when logging is disabled and the subscriber was never installed.
pub fn init_logging(enabled: bool, log_dir: Option<&Path>) -> io::Result<Option<PathBuf>> {
    if !enabled {
        return Ok(None);
    }

    let dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&dir)?;

    let path = dir.join(format!("sqltools-{}.log", std::process::id()));
    let file = File::create(&path)?;

    let _ = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_max_level(LevelFilter::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    Ok(Some(path))
}
