use std::path::PathBuf;
use std::time::Duration;

use crate::controller::PollConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
const DEFAULT_DASHBOARD_DELAY_MS: u64 = 1200;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub poll: PollConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_url = env_or_fallback("JOBLENS_API_URL", "API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let data_dir = std::env::var("JOBLENS_DATA_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let poll_interval = env_millis("JOBLENS_POLL_INTERVAL_MS")
            .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        let dashboard_delay = env_millis("JOBLENS_DASHBOARD_DELAY_MS")
            .unwrap_or(Duration::from_millis(DEFAULT_DASHBOARD_DELAY_MS));
        let max_transient_failures = std::env::var("JOBLENS_MAX_TRANSIENT_FAILURES")
            .ok()
            .and_then(|s| parse_positive(&s));

        Self {
            api_url,
            data_dir,
            poll: PollConfig {
                interval: poll_interval,
                dashboard_delay,
                max_transient_failures,
            },
        }
    }

    pub fn with_overrides(mut self, api_url: Option<String>, data_dir: Option<PathBuf>) -> Self {
        if let Some(url) = api_url {
            self.api_url = url;
        }
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            dashboard_delay: Duration::from_millis(DEFAULT_DASHBOARD_DELAY_MS),
            max_transient_failures: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "joblens") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".joblens")
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| parse_positive(&s))
        .map(|ms| Duration::from_millis(ms as u64))
}

fn parse_positive(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|n| *n > 0)
}
