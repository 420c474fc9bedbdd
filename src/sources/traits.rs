use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::ScrollResult;

/// Decoded upstream response. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

impl RawResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Retry-After` as whole seconds; HTTP-date and junk values count as absent.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }
}

/// Raw request primitive. Dropping the returned future cancels the request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET for `url` with the given request headers.
    async fn get(&self, url: &str, headers: Vec<(String, String)>) -> ScrollResult<RawResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, url: &str, headers: Vec<(String, String)>) -> ScrollResult<RawResponse> {
        (**self).get(url, headers).await
    }
}

pub trait Connectivity: Send + Sync {
    /// Current reachability, readable at any time
    fn is_online(&self) -> bool;

    /// Receiver that yields once per offline -> online transition.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}
