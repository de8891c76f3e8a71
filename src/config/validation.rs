//! Structural validation of the agent config document.
//!
//! The [`validate`] function checks a parsed
//! [`RawDocument`](super::model::RawDocument) for errors such as
//! unlisted manager sections, missing repo subsections, absent transport
//! options, and malformed reloader URLs. Returns a list of
//! [`ValidationError`] values with per-field suggestions.

use url::Url;

use super::model::{RawDocument, ReloadMethod, RepoMethod};
use crate::error::ValidationError;

pub fn validate(doc: &RawDocument) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if doc.globals.scheduler_interval == 0 {
        errors.push(ValidationError {
            section: "globals".into(),
            field: "scheduler-interval".into(),
            message: "must be a positive number of seconds".into(),
            suggestion: None,
        });
    }

    if doc.globals.status_file.as_os_str().is_empty() {
        errors.push(ValidationError {
            section: "globals".into(),
            field: "status-file".into(),
            message: "path cannot be empty".into(),
            suggestion: None,
        });
    }

    if doc.globals.config_managers.is_empty() {
        errors.push(ValidationError {
            section: "globals".into(),
            field: "config-managers".into(),
            message: "at least one manager must be listed".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    for name in &doc.globals.config_managers {
        let Some(section) = doc.managers.get(name) else {
            errors.push(ValidationError {
                section: name.clone(),
                field: "(section)".into(),
                message: "listed in config-managers but has no section".into(),
                suggestion: Some(format!("add a [{name}] section")),
            });
            continue;
        };

        if section.dest_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                section: name.clone(),
                field: "dest-path".into(),
                message: "path cannot be empty".into(),
                suggestion: None,
            });
        }

        if section.primary_config.is_empty() {
            errors.push(ValidationError {
                section: name.clone(),
                field: "primary-config".into(),
                message: "at least one primary config file must be listed".into(),
                suggestion: None,
            });
        }

        if section.repos.is_empty() {
            errors.push(ValidationError {
                section: name.clone(),
                field: "repos".into(),
                message: "at least one repo must be listed".into(),
                suggestion: None,
            });
        }

        for repo in &section.repos {
            let Some(opts) = section.repo_opts.get(repo) else {
                errors.push(ValidationError {
                    section: name.clone(),
                    field: repo.clone(),
                    message: "listed in repos but has no subsection".into(),
                    suggestion: Some(format!("add a [{name}.{repo}] subsection")),
                });
                continue;
            };

            match opts.method {
                RepoMethod::Http | RepoMethod::Https => {
                    if opts.host.as_deref().unwrap_or("").is_empty() {
                        errors.push(ValidationError {
                            section: format!("{name}.{repo}"),
                            field: "host".into(),
                            message: "host is required for http/https repos".into(),
                            suggestion: None,
                        });
                    }
                }
                RepoMethod::S3 => {
                    if opts.bucket.as_deref().unwrap_or("").is_empty()
                        || opts.region.as_deref().unwrap_or("").is_empty()
                    {
                        errors.push(ValidationError {
                            section: format!("{name}.{repo}"),
                            field: "bucket/region".into(),
                            message: "bucket and region are required for s3 repos".into(),
                            suggestion: None,
                        });
                    }
                }
                RepoMethod::File => {
                    if opts.repo_path.is_empty() {
                        errors.push(ValidationError {
                            section: format!("{name}.{repo}"),
                            field: "repo-path".into(),
                            message: "repo-path is required for file repos".into(),
                            suggestion: None,
                        });
                    }
                }
            }

            if opts.timeout == 0 {
                errors.push(ValidationError {
                    section: format!("{name}.{repo}"),
                    field: "timeout".into(),
                    message: "must be a positive number of seconds".into(),
                    suggestion: None,
                });
            }
        }

        if section.reloader.method != ReloadMethod::None {
            match section.reloader.url.as_deref() {
                None | Some("") => {
                    errors.push(ValidationError {
                        section: format!("{name}.reloader"),
                        field: "url".into(),
                        message: "url is required when a reload method is set".into(),
                        suggestion: None,
                    });
                }
                Some(raw) => match Url::parse(raw) {
                    Ok(parsed) => {
                        let scheme = parsed.scheme();
                        if scheme != "http" && scheme != "https" {
                            errors.push(ValidationError {
                                section: format!("{name}.reloader"),
                                field: "url".into(),
                                message: format!(
                                    "'{raw}' uses unsupported scheme '{scheme}' (expected http or https)"
                                ),
                                suggestion: None,
                            });
                        }
                    }
                    Err(_) => {
                        errors.push(ValidationError {
                            section: format!("{name}.reloader"),
                            field: "url".into(),
                            message: format!("'{raw}' is not a valid URL"),
                            suggestion: None,
                        });
                    }
                },
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
