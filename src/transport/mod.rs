//! Transport abstraction over heterogeneous fetch backends.
//!
//! Defines the [`Transport`] trait (uniform `get(url) → Response`),
//! the [`Response`] contract shared by every backend, and scheme-based
//! construction. Submodules provide the http(s), s3, and local-file
//! implementations.

pub mod file;
pub mod http;
pub mod s3;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::config::model::{RepoConfig, RepoMethod};
use crate::error::ButlerError;

/// Result of a transport `get`.
///
/// `status` follows HTTP semantics; byte-stream transports synthesize a
/// code (200 success, 404 missing, 504 unreachable, 500 local I/O fault).
/// The body is consumed at most once via [`Response::bytes`].
#[derive(Debug)]
pub struct Response {
    status: u16,
    body: ResponseBody,
}

#[derive(Debug)]
enum ResponseBody {
    Buffered(Bytes),
    Http(reqwest::Response),
}

impl Response {
    #[must_use]
    pub fn buffered(status: u16, body: Bytes) -> Self {
        Self {
            status,
            body: ResponseBody::Buffered(body),
        }
    }

    pub(crate) fn from_http(response: reqwest::Response) -> Self {
        Self {
            status: response.status().as_u16(),
            body: ResponseBody::Http(response),
        }
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Consume the body. Taking `self` enforces the at-most-one-consumer
    /// contract at compile time.
    pub async fn bytes(self) -> Result<Bytes, ButlerError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Http(response) => {
                let url = response.url().to_string();
                response.bytes().await.map_err(|e| ButlerError::Transport {
                    url,
                    status: 500,
                    detail: format!("could not read response body: {e}"),
                })
            }
        }
    }
}

// async_trait is required here because Transport is used as
// Box<dyn Transport> and native async fn in traits does not support
// dyn dispatch.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch one absolute resource identifier whose scheme matches this
    /// transport. No retries; timeouts surface as errors.
    async fn get(&self, url: &str) -> Result<Response, ButlerError>;
}

/// Options for constructing a transport from a bare URL (the agent's own
/// config fetch).
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub insecure: bool,
    pub s3_region: Option<String>,
}

/// Build the transport matching one repo subsection.
pub async fn for_repo(repo: &RepoConfig) -> Result<Box<dyn Transport>, ButlerError> {
    match repo.method {
        RepoMethod::Http | RepoMethod::Https => Ok(Box::new(http::HttpTransport::new(
            Duration::from_secs(repo.timeout),
            repo.insecure,
        )?)),
        RepoMethod::S3 => {
            let region = repo.region.clone().unwrap_or_default();
            Ok(Box::new(s3::S3Transport::new(&region).await))
        }
        RepoMethod::File => Ok(Box::new(file::FileTransport)),
    }
}

/// Build the transport matching a URL's scheme.
pub async fn for_url(url: &str, opts: &TransportOptions) -> Result<Box<dyn Transport>, ButlerError> {
    let parsed = Url::parse(url).map_err(|e| ButlerError::UrlParse {
        url: url.to_string(),
        source: e,
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(Box::new(http::HttpTransport::new(
            opts.timeout,
            opts.insecure,
        )?)),
        "s3" => {
            let region = opts.s3_region.clone().unwrap_or_default();
            Ok(Box::new(s3::S3Transport::new(&region).await))
        }
        "file" => Ok(Box::new(file::FileTransport)),
        other => Err(ButlerError::UnsupportedScheme(other.to_string())),
    }
}
