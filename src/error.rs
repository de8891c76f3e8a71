//! Unified error types for butler.
//!
//! Defines [`ButlerError`] (the main crate error enum),
//! [`ValidationError`] for agent-config validation failures, and
//! [`ReloadError`] for manager reload failures. All use `thiserror`
//! for `Display` and `Error` derives.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  [{}]: {} — {}", self.section, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

/// How a manager reload failed.
///
/// The integer code space (`1` timeout, `2` bad status, `3` other) survives
/// from the metric contract; callers branch on [`ReloadFailure::Timeout`]
/// rather than the number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadFailure {
    Timeout,
    BadStatus(u16),
    Other(String),
}

impl ReloadFailure {
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Timeout => 1,
            Self::BadStatus(_) => 2,
            Self::Other(_) => 3,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("reload of manager '{manager}' failed (code={}): {failure:?}", failure.code())]
pub struct ReloadError {
    pub manager: String,
    pub failure: ReloadFailure,
}

impl ReloadError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.failure, ReloadFailure::Timeout)
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ButlerError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported URL scheme: '{0}'")]
    UnsupportedScheme(String),

    #[error("Transport error fetching {url} (status={status}): {detail}")]
    Transport {
        url: String,
        status: u16,
        detail: String,
    },

    #[error("Unbalanced sentinel markers in {filename} (manager {manager})")]
    UnbalancedSentinels { filename: String, manager: String },

    #[error("Content of {filename} failed validation (manager {manager}): {source}")]
    ContentParse {
        filename: String,
        manager: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("Cannot write status file {}: {source}", path.display())]
    StatusFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid URL '{url}': {source}")]
    UrlParse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ButlerError {
    /// Fatal errors stop the agent even when `exit-on-failure` is unset.
    ///
    /// A status file that cannot be written would poison the next tick's
    /// self-heal decision.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::StatusFile { .. })
    }
}
