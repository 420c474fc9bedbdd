use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrollError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Connectivity errors
    #[error("Network is offline")]
    Offline,

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by upstream")]
    RateLimited { retry_after_secs: Option<u64> },

    // Batch errors
    #[error("No usable articles in batch")]
    NoArticles,

    // Network errors
    #[error("HTTP {0}")]
    Status(u16),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network request failed: {0}")]
    Network(String),
}

impl ScrollError {
    /// Errors describing the channel rather than a single payload.
    /// These override partial success in a batch.
    pub fn is_systemic(&self) -> bool {
        matches!(self, ScrollError::RateLimited { .. } | ScrollError::Timeout)
    }
}

pub type ScrollResult<T> = Result<T, ScrollError>;

pub const GENERIC_FAILURE: &str = "Failed to load articles. Please try again.";

/// Closed set of load failures surfaced to the rendering side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    Offline,
    Timeout,
    RateLimited { retry_after_secs: Option<u64> },
    NoArticles,
    Failed { message: String },
}

impl ErrorKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "offline",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited { .. } => "rate_limited",
            ErrorKind::NoArticles => "no_articles",
            ErrorKind::Failed { .. } => "failed",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "You're offline",
            ErrorKind::Timeout => "Request timed out",
            ErrorKind::RateLimited { .. } => "Too many requests",
            ErrorKind::NoArticles => "No articles found",
            ErrorKind::Failed { .. } => "Failed to load articles",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "Check your internet connection and try again.",
            ErrorKind::Timeout => {
                "The request took too long. Check your connection and try again."
            }
            ErrorKind::RateLimited { .. } => {
                "Wikipedia is rate limiting us. Please wait a moment and try again."
            }
            ErrorKind::NoArticles => "No articles could be loaded. Try again in a moment.",
            ErrorKind::Failed { .. } => "Something went wrong while fetching articles.",
        }
    }

    pub fn retry_label(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "Retry connection",
            _ => "Try again",
        }
    }
}

impl From<&ScrollError> for ErrorKind {
    fn from(err: &ScrollError) -> Self {
        match err {
            ScrollError::Offline => ErrorKind::Offline,
            ScrollError::Timeout => ErrorKind::Timeout,
            ScrollError::RateLimited { retry_after_secs } => ErrorKind::RateLimited {
                retry_after_secs: *retry_after_secs,
            },
            ScrollError::NoArticles => ErrorKind::NoArticles,
            _ => ErrorKind::Failed {
                message: GENERIC_FAILURE.to_string(),
            },
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Failed { message } => f.write_str(message),
            ErrorKind::RateLimited {
                retry_after_secs: Some(secs),
            } => write!(f, "rate_limited (retry after {}s)", secs),
            other => f.write_str(other.tag()),
        }
    }
}
