//! [`HttpPort`] backed by a shared `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::error::SigtraderError;
use crate::ports::http_port::{HttpPort, HttpRequest, HttpResponse, TransportError};

const USER_AGENT: &str = concat!("sigtrader/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: Client,
}

impl ReqwestHttp {
    /// Build a client with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, SigtraderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SigtraderError::Transport {
                source_name: "http",
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

fn transport(err: reqwest::Error) -> TransportError {
    let reason = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    TransportError { reason }
}

#[async_trait]
impl HttpPort for ReqwestHttp {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(transport)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
