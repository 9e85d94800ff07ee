//! Tracing setup and the single channel for failures we recover from silently.

use anyhow::{Context, Result};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "joblens=info";
const VERBOSE_LOG_FILTER: &str = "joblens=debug";
const LOG_FILE_NAME: &str = "joblens.log";

pub struct LogConfig<'a> {
    pub verbose: bool,
    /// Log to a file in `data_dir` instead of stderr so the dashboard stays intact.
    pub tui_mode: bool,
    pub data_dir: &'a Path,
}

pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    if config.tui_mode {
        std::fs::create_dir_all(config.data_dir).with_context(|| {
            format!("Failed to create data directory: {}", config.data_dir.display())
        })?;
        let path = config.data_dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    }

    Ok(())
}

/// Funnel for failures that must never reach the user: corrupt persisted
/// state, failed result fetches, transient status checks. The failure is
/// logged and the caller falls back to `None`.
pub fn recovered<T, E: Display>(what: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            note_recovered(what, &e);
            None
        }
    }
}

pub fn note_recovered(what: &str, err: &dyn Display) {
    tracing::warn!(target: "joblens::recovered", "{}: {}", what, err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovered_passes_values_through() {
        let ok: Result<u32, String> = Ok(3);
        assert_eq!(recovered("value", ok), Some(3));
    }

    #[test]
    fn test_recovered_swallows_errors() {
        let err: Result<u32, String> = Err("boom".to_string());
        assert_eq!(recovered("value", err), None);
    }
}
