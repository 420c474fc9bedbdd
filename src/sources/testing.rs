//! Scripted transport for exercising retry and batch behaviour on virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::errors::{ScrollError, ScrollResult};
use crate::sources::traits::{RawResponse, Transport};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(serde_json::Value),
    Status(u16),
    RateLimited(Option<u64>),
    NetworkError,
    Hang,
    Delayed(Duration, serde_json::Value),
}

type Script = Box<dyn Fn(usize) -> Reply + Send + Sync>;

/// Answers call `n` (zero-based, across all slots) with `script(n)`.
pub(crate) struct ScriptedTransport {
    calls: AtomicUsize,
    script: Script,
}

impl ScriptedTransport {
    pub(crate) fn new(script: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Box::new(script),
        }
    }

    pub(crate) fn always(reply: Reply) -> Self {
        Self::new(move |_| reply.clone())
    }

    /// Every call returns a valid summary with a fresh id.
    pub(crate) fn unique_articles() -> Self {
        Self::new(|n| Reply::Json(summary(n as i64 + 1)))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, _url: &str, _headers: Vec<(String, String)>) -> ScrollResult<RawResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.script)(n) {
            Reply::Json(body) => Ok(RawResponse::ok(body)),
            Reply::Status(status) => Ok(RawResponse::status(status)),
            Reply::RateLimited(Some(secs)) => {
                Ok(RawResponse::status(429).with_header("Retry-After", &secs.to_string()))
            }
            Reply::RateLimited(None) => Ok(RawResponse::status(429)),
            Reply::NetworkError => Err(ScrollError::Network("connection reset".to_string())),
            Reply::Hang => std::future::pending().await,
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(RawResponse::ok(body))
            }
        }
    }
}

pub(crate) fn summary(id: i64) -> serde_json::Value {
    json!({
        "pageid": id,
        "title": format!("Article {}", id),
        "extract": "This is a sufficiently long extract for the article to pass validation checks.",
        "lang": "en"
    })
}

pub(crate) fn summary_with_extract(id: i64, extract: &str) -> serde_json::Value {
    let mut body = summary(id);
    body["extract"] = json!(extract);
    body
}
