use std::time::Duration;

use url::Url;

use crate::errors::{ScrollError, ScrollResult};

pub const DEFAULT_API_BASE: &str = "https://en.wikipedia.org/api/rest_v1";
pub const DEFAULT_PAGE_BASE: &str = "https://en.wikipedia.org/wiki/";

/// Batch size for an empty feed
pub const INITIAL_BATCH: usize = 8;
/// Batch size for every later "load more"
pub const NEXT_BATCH: usize = 5;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub api_base: String,
    pub page_base: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl FetchConfig {
    pub fn summary_url(&self) -> String {
        format!("{}/page/random/summary", self.api_base.trim_end_matches('/'))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            page_base: DEFAULT_PAGE_BASE.to_string(),
            request_timeout: Duration::from_millis(10_000),
            max_attempts: 3,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub settle_delay: Duration,
    pub recovery_batch_empty: usize,
    pub recovery_batch: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            recovery_batch_empty: INITIAL_BATCH,
            recovery_batch: NEXT_BATCH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub loader: LoaderConfig,
}

impl Config {
    /// Get the directory where the executable is located
    fn exe_dir() -> Option<std::path::PathBuf> {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    pub fn from_env() -> ScrollResult<Self> {
        // Try to load .env from executable's directory first
        if let Some(dir) = Self::exe_dir() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                dotenvy::from_path(&env_path).ok();
            }
        }
        // Fall back to current directory
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> ScrollResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup("WIKISCROLL_API_BASE") {
            config.fetch.api_base = parse_base_url("WIKISCROLL_API_BASE", &base)?;
        }
        if let Some(base) = lookup("WIKISCROLL_PAGE_BASE") {
            config.fetch.page_base = parse_base_url("WIKISCROLL_PAGE_BASE", &base)?;
        }
        if let Some(ms) = lookup("WIKISCROLL_REQUEST_TIMEOUT_MS") {
            config.fetch.request_timeout = parse_millis("WIKISCROLL_REQUEST_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("WIKISCROLL_RETRY_DELAY_MS") {
            config.fetch.retry_delay = parse_millis("WIKISCROLL_RETRY_DELAY_MS", &ms)?;
        }
        if let Some(ms) = lookup("WIKISCROLL_SETTLE_DELAY_MS") {
            config.loader.settle_delay = parse_millis("WIKISCROLL_SETTLE_DELAY_MS", &ms)?;
        }
        if let Some(attempts) = lookup("WIKISCROLL_MAX_ATTEMPTS") {
            let attempts: u32 = attempts.trim().parse().map_err(|_| {
                ScrollError::Config(format!("WIKISCROLL_MAX_ATTEMPTS: not a number: {}", attempts))
            })?;
            if attempts == 0 {
                return Err(ScrollError::Config(
                    "WIKISCROLL_MAX_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            config.fetch.max_attempts = attempts;
        }

        Ok(config)
    }

    /// Host and port of the API base, used for connectivity probing. The
    /// port falls back to the scheme default.
    pub fn api_host(&self) -> Option<(String, u16)> {
        let url = Url::parse(&self.fetch.api_base).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some((host, port))
    }
}

fn parse_base_url(key: &str, value: &str) -> ScrollResult<String> {
    let parsed = Url::parse(value.trim())
        .map_err(|e| ScrollError::InvalidUrl(format!("{}: {}", key, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ScrollError::InvalidUrl(format!(
            "{}: unsupported scheme {}",
            key,
            parsed.scheme()
        )));
    }
    Ok(value.trim().to_string())
}

fn parse_millis(key: &str, value: &str) -> ScrollResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ScrollError::Config(format!("{}: not a number: {}", key, value)))
}
