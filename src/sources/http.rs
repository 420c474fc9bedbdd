use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;

use crate::errors::ScrollResult;
use crate::sources::traits::{RawResponse, Transport};

const USER_AGENT: &str = concat!("wikiscroll/", env!("CARGO_PKG_VERSION"));

/// `Transport` backed by a shared reqwest client. Timeouts are applied by
/// the caller, so the client itself has none.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: Vec<(String, String)>) -> ScrollResult<RawResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        // Error bodies are often HTML; only successful bodies must be JSON.
        let body = if response.status().is_success() {
            response.json::<serde_json::Value>().await?
        } else {
            serde_json::Value::Null
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
