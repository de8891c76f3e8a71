//! Serde data structures for the butler agent configuration document.
//!
//! The document is TOML with a `[globals]` section and one section per
//! manager; manager sections in turn hold one subsection per repo plus
//! `mustache-subs` and `reloader`. Repo names are free-form keys, so the
//! manager and top-level sections use `#[serde(flatten)]` maps and are
//! resolved into the typed [`AgentConfig`] after parsing.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Deserialize;

const fn default_scheduler_interval() -> u64 {
    300
}

const fn default_repo_timeout() -> u64 {
    10
}

const fn default_reload_timeout() -> u64 {
    10
}

fn default_status_file() -> PathBuf {
    PathBuf::from("/var/tmp/butler.status")
}

/// `[globals]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Globals {
    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval: u64,

    #[serde(default)]
    pub exit_on_failure: bool,

    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,

    #[serde(default)]
    pub config_managers: Vec<String>,
}

/// Transport method for one repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoMethod {
    Http,
    Https,
    S3,
    File,
}

/// One `[<manager>.<repo>]` subsection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RepoConfig {
    pub method: RepoMethod,

    /// Host for http(s) repos.
    pub host: Option<String>,

    /// Path prefix below the host / bucket / local filesystem.
    #[serde(default)]
    pub repo_path: String,

    #[serde(default = "default_repo_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub insecure: bool,

    /// S3 only.
    pub bucket: Option<String>,

    /// S3 only.
    pub region: Option<String>,
}

impl RepoConfig {
    /// Absolute source URL for one file below this repo.
    #[must_use]
    pub fn file_url(&self, file: &str) -> String {
        let prefix = self.repo_path.trim_matches('/');
        let joined = if prefix.is_empty() {
            file.trim_start_matches('/').to_string()
        } else {
            format!("{prefix}/{}", file.trim_start_matches('/'))
        };
        match self.method {
            RepoMethod::Http => {
                format!("http://{}/{joined}", self.host.as_deref().unwrap_or(""))
            }
            RepoMethod::Https => {
                format!("https://{}/{joined}", self.host.as_deref().unwrap_or(""))
            }
            RepoMethod::S3 => {
                format!("s3://{}/{joined}", self.bucket.as_deref().unwrap_or(""))
            }
            RepoMethod::File => format!("file:///{joined}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadMethod {
    Get,
    Post,
    #[default]
    None,
}

/// `[<manager>.reloader]` subsection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReloaderConfig {
    #[serde(default)]
    pub method: ReloadMethod,

    pub url: Option<String>,

    #[serde(default = "default_reload_timeout")]
    pub timeout: u64,
}

impl Default for ReloaderConfig {
    fn default() -> Self {
        Self {
            method: ReloadMethod::None,
            url: None,
            timeout: default_reload_timeout(),
        }
    }
}

/// Raw shape of one manager section; repo subsections land in `repo_opts`
/// via the flatten map and are resolved against `repos` afterwards.
/// The flatten map rules out `deny_unknown_fields` here and on
/// [`RawDocument`]; stray keys surface as repo-subsection parse errors
/// instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManagerSection {
    #[serde(default)]
    pub repos: Vec<String>,

    pub dest_path: PathBuf,

    #[serde(default)]
    pub primary_config: Vec<String>,

    #[serde(default)]
    pub additional_config: Vec<String>,

    #[serde(default)]
    pub mustache_subs: BTreeMap<String, String>,

    #[serde(default)]
    pub clean_files: bool,

    #[serde(default)]
    pub enable_cache: bool,

    pub cache_path: Option<PathBuf>,

    #[serde(default)]
    pub manager_timeout_ok: bool,

    #[serde(default)]
    pub reloader: ReloaderConfig,

    #[serde(flatten)]
    pub repo_opts: HashMap<String, RepoConfig>,
}

/// Raw shape of the whole document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub globals: Globals,

    #[serde(flatten)]
    pub managers: HashMap<String, ManagerSection>,
}

/// Classification of a managed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Primary,
    Additional,
}

impl FileClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Additional => "additional",
        }
    }
}

/// One file to materialize: relative path below the manager's
/// destination directory plus its classification.
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub file: String,
    pub class: FileClass,
}

/// A fully resolved manager: section fields plus its ordered repos.
#[derive(Debug, Clone)]
pub struct Manager {
    pub name: String,
    pub dest_path: PathBuf,
    pub primary_config: Vec<String>,
    pub additional_config: Vec<String>,
    /// Ordered alternates; the first repo that serves a file wins.
    pub repos: Vec<(String, RepoConfig)>,
    pub mustache_subs: BTreeMap<String, String>,
    pub clean_files: bool,
    pub enable_cache: bool,
    pub cache_path: Option<PathBuf>,
    pub manager_timeout_ok: bool,
    pub reloader: ReloaderConfig,
}

impl Manager {
    #[must_use]
    pub fn file_specs(&self, class: FileClass) -> Vec<FileSpec> {
        let files = match class {
            FileClass::Primary => &self.primary_config,
            FileClass::Additional => &self.additional_config,
        };
        files
            .iter()
            .map(|f| FileSpec {
                file: f.clone(),
                class,
            })
            .collect()
    }

    /// Absolute destination path for one managed file.
    #[must_use]
    pub fn dest_file(&self, file: &str) -> PathBuf {
        self.dest_path.join(file.trim_start_matches('/'))
    }

    /// Absolute destination paths of every primary + additional file.
    #[must_use]
    pub fn all_dest_paths(&self) -> Vec<PathBuf> {
        self.primary_config
            .iter()
            .chain(self.additional_config.iter())
            .map(|f| self.dest_file(f))
            .collect()
    }
}

/// The immutable top-level agent configuration. Replaced wholesale on
/// every successful re-fetch; never mutated in place.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub globals: Globals,
    pub managers: Vec<Manager>,
}

impl AgentConfig {
    #[must_use]
    pub fn manager(&self, name: &str) -> Option<&Manager> {
        self.managers.iter().find(|m| m.name == name)
    }
}
