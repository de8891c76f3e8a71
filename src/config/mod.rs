//! Agent configuration loading, validation, and change detection.
//!
//! The document flows raw bytes → [`RawDocument`](model::RawDocument)
//! (TOML parse) → structural [`validation`] → resolved
//! [`AgentConfig`](model::AgentConfig). A SHA-256 digest of the raw
//! bytes is the [`ConfigVersion`] used for whole-document change
//! detection.

pub mod model;
pub mod validation;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::ButlerError;
use model::{AgentConfig, Manager, RawDocument};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Parse the raw TOML bytes of an agent config document.
pub fn parse_document(data: &[u8], path_label: &str) -> Result<RawDocument, ButlerError> {
    let text = std::str::from_utf8(data).map_err(|e| ButlerError::ConfigParse {
        path: path_label.to_string(),
        source: Box::new(e),
    })?;
    toml::from_str(text).map_err(|e| ButlerError::ConfigParse {
        path: path_label.to_string(),
        source: Box::new(e),
    })
}

/// Parse, validate, and resolve an agent config document, returning the
/// immutable [`AgentConfig`] and its content-hash version.
///
/// `default_subs` are CLI-provided mustache substitutions merged beneath
/// each manager's own map (the manager wins on collision).
pub fn load(
    data: &[u8],
    path_label: &str,
    default_subs: &BTreeMap<String, String>,
) -> Result<(AgentConfig, ConfigVersion), ButlerError> {
    let doc = parse_document(data, path_label)?;

    if let Err(errors) = validation::validate(&doc) {
        return Err(ButlerError::ConfigValidation { errors });
    }

    let config = resolve(doc, default_subs);
    let hash = sha256_hex(data);
    Ok((config, ConfigVersion::Hash(hash)))
}

/// Build the resolved [`AgentConfig`] from a validated document.
///
/// Assumes [`validation::validate`] has passed: every listed manager has a
/// section and every listed repo a subsection.
fn resolve(doc: RawDocument, default_subs: &BTreeMap<String, String>) -> AgentConfig {
    let mut managers = Vec::with_capacity(doc.globals.config_managers.len());

    for name in &doc.globals.config_managers {
        let Some(section) = doc.managers.get(name) else {
            continue;
        };

        let repos = section
            .repos
            .iter()
            .filter_map(|r| {
                section
                    .repo_opts
                    .get(r)
                    .map(|opts| (r.clone(), opts.clone()))
            })
            .collect();

        let mut subs = default_subs.clone();
        subs.extend(section.mustache_subs.clone());

        managers.push(Manager {
            name: name.clone(),
            dest_path: section.dest_path.clone(),
            primary_config: section.primary_config.clone(),
            additional_config: section.additional_config.clone(),
            repos,
            mustache_subs: subs,
            clean_files: section.clean_files,
            enable_cache: section.enable_cache,
            cache_path: section.cache_path.clone(),
            manager_timeout_ok: section.manager_timeout_ok,
            reloader: section.reloader.clone(),
        });
    }

    AgentConfig {
        globals: doc.globals,
        managers,
    }
}
