//! HTTP / HTTPS transport.
//!
//! A thin wrapper over a `reqwest` client with a per-request timeout and
//! an optional `insecure` mode that skips TLS certificate verification
//! (self-signed internal mirrors). Upstream status codes pass through
//! unchanged; connection-level failures synthesize 504 and everything
//! else 500.

use std::time::Duration;

use async_trait::async_trait;

use super::{Response, Transport};
use crate::error::ButlerError;

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, insecure: bool) -> Result<Self, ButlerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| ButlerError::Transport {
                url: String::new(),
                status: 500,
                detail: format!("could not build http client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get(&self, url: &str) -> Result<Response, ButlerError> {
        match self.client.get(url).send().await {
            Ok(response) => Ok(Response::from_http(response)),
            Err(e) => {
                let status = if e.is_timeout() || e.is_connect() {
                    504
                } else {
                    500
                };
                Err(ButlerError::Transport {
                    url: url.to_string(),
                    status,
                    detail: e.to_string(),
                })
            }
        }
    }
}
