//! Manager reload invocation.
//!
//! A [`Reloader`] signals the managed service to pick up new
//! configuration, typically an HTTP endpoint like Prometheus's
//! `/-/reload`. The `None` variant is for services that watch their own
//! config files and always succeeds.

use std::time::Duration;

use crate::config::model::{ReloadMethod, ReloaderConfig};
use crate::error::{ReloadError, ReloadFailure};

#[derive(Debug, Clone)]
pub enum Reloader {
    HttpGet { url: String, timeout: Duration },
    HttpPost { url: String, timeout: Duration },
    None,
}

impl Reloader {
    /// Build from a manager's `[<name>.reloader]` section. The section is
    /// validated up front, so a get/post method always carries a URL.
    #[must_use]
    pub fn from_config(config: &ReloaderConfig) -> Self {
        let url = config.url.clone().unwrap_or_default();
        let timeout = Duration::from_secs(config.timeout);
        match config.method {
            ReloadMethod::Get => Self::HttpGet { url, timeout },
            ReloadMethod::Post => Self::HttpPost { url, timeout },
            ReloadMethod::None => Self::None,
        }
    }

    pub async fn reload(&self, manager: &str) -> Result<(), ReloadError> {
        let (url, timeout, post) = match self {
            Self::None => {
                tracing::debug!(manager = %manager, "no reloader configured, nothing to signal");
                return Ok(());
            }
            Self::HttpGet { url, timeout } => (url, *timeout, false),
            Self::HttpPost { url, timeout } => (url, *timeout, true),
        };

        let fail = |failure: ReloadFailure| ReloadError {
            manager: manager.to_string(),
            failure,
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| fail(ReloadFailure::Other(e.to_string())))?;

        let request = if post {
            client.post(url)
        } else {
            client.get(url)
        };

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(manager = %manager, url = %url, "reload signalled");
                Ok(())
            }
            Ok(response) => Err(fail(ReloadFailure::BadStatus(response.status().as_u16()))),
            Err(e) if e.is_timeout() => Err(fail(ReloadFailure::Timeout)),
            Err(e) => Err(fail(ReloadFailure::Other(e.to_string()))),
        }
    }
}
