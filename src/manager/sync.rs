//! The per-manager synchronization pipeline.
//!
//! One pass: ensure directories → fetch primary and additional sets in
//! parallel → validate and substitute → diff against disk → atomic swap
//! → reload with rollback-on-failure. Any per-file transport or
//! validation error aborts the whole pass with no destination mutation;
//! other managers are unaffected.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;

use crate::cache;
use crate::config::model::{FileClass, Manager};
use crate::error::ButlerError;
use crate::manager::ManagerState;
use crate::metrics;
use crate::reloader::Reloader;
use crate::status::StatusFile;
use crate::transport;
use crate::validator;

/// Run one sync pass for one manager.
///
/// The caller holds the manager's sync guard; within a manager the steps
/// are strictly sequential. Every log line of one pass carries the same
/// correlation id.
pub async fn run(
    manager: &Manager,
    state: &ManagerState,
    status: &StatusFile,
) -> Result<(), ButlerError> {
    use tracing::Instrument;

    let run_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("sync", manager = %manager.name, run_id = %run_id);
    run_inner(manager, state, status).instrument(span).await
}

async fn run_inner(
    manager: &Manager,
    state: &ManagerState,
    status: &StatusFile,
) -> Result<(), ButlerError> {
    ensure_directories(manager, state).await?;

    let (primary, additional) = tokio::join!(
        fetch_set(manager, FileClass::Primary),
        fetch_set(manager, FileClass::Additional),
    );

    let staged = match (primary, additional) {
        (Ok(p), Ok(a)) => {
            let mut staged = p;
            staged.extend(a);
            staged
        }
        (p, a) => {
            tracing::warn!("fetch failed, destination untouched");
            state.mark_run();
            return Err(p.err().or_else(|| a.err()).unwrap_or_else(|| {
                ButlerError::Transport {
                    url: String::new(),
                    status: 500,
                    detail: "fetch failed".into(),
                }
            }));
        }
    };
    metrics::set_remote_repo_up(&manager.name, true);
    metrics::set_remote_repo_sanity(&manager.name, true);

    let changed = diff(&staged).await;
    let reload_pending = state.reload_pending();

    if changed.is_empty() && !reload_pending {
        metrics::set_repo_in_sync(&manager.name, true);

        // Self-heal: a manager previously recorded as failed gets a
        // reload even though no file changed, to converge drifted state.
        if status.get(&manager.name).await == Some(false) {
            tracing::info!("manager marked failed, forcing reload to converge");
            let outcome = reload_and_record(manager, state, status).await;
            state.mark_run();
            return outcome;
        }

        tracing::debug!("files unchanged, nothing to do");
        state.mark_run();
        return Ok(());
    }

    if let Err(e) = swap(manager, state, &staged, &changed).await {
        state.mark_run();
        return Err(e);
    }
    tracing::info!(files = changed.len(), "destination updated, reloading");

    let outcome = reload_and_record(manager, state, status).await;
    state.mark_run();
    outcome
}

/// Step 1: create missing parent directories (mode 0755). A fresh
/// directory means a fresh install; the manager must reload even when
/// the staged bytes end up matching nothing on disk.
async fn ensure_directories(manager: &Manager, state: &ManagerState) -> Result<(), ButlerError> {
    for path in manager.all_dest_paths() {
        let Some(dir) = path.parent() else {
            continue;
        };
        if tokio::fs::try_exists(dir).await.unwrap_or(false) {
            continue;
        }

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder.create(dir).await?;

        tracing::info!(dir = %dir.display(), "created destination directory");
        state.set_reload_pending(true);
    }
    Ok(())
}

/// Steps 2–3 for one class: fetch every file, validate, substitute, and
/// stage keyed by destination path.
async fn fetch_set(
    manager: &Manager,
    class: FileClass,
) -> Result<BTreeMap<PathBuf, Bytes>, ButlerError> {
    let mut staged = BTreeMap::new();
    for spec in manager.file_specs(class) {
        let data = fetch_one(manager, &spec.file, class).await?;
        staged.insert(manager.dest_file(&spec.file), data);
    }
    Ok(staged)
}

/// Fetch one file. Repos are ordered alternates for transport-level
/// failures; a body that fails validation aborts immediately since the
/// source itself is corrupt.
async fn fetch_one(
    manager: &Manager,
    file: &str,
    class: FileClass,
) -> Result<Bytes, ButlerError> {
    let mut last_err = None;

    for (repo_name, repo) in &manager.repos {
        let url = repo.file_url(file);

        let response = match transport::for_repo(repo).await {
            Ok(t) => t.get(&url).await,
            Err(e) => Err(e),
        };

        match response {
            Ok(response) if response.status() == 200 => {
                let data = match response.bytes().await {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(repo = %repo_name, url = %url, error = %e,
                            "could not read response body");
                        last_err = Some(e);
                        continue;
                    }
                };

                let region = validator::validate(&data, file, &manager.name).map_err(|e| {
                    tracing::error!(repo = %repo_name, url = %url, error = %e,
                        "fetched file failed validation");
                    metrics::set_remote_repo_sanity(&manager.name, false);
                    e
                })?;

                return validator::substitute(region, &manager.mustache_subs, file, &manager.name);
            }
            Ok(response) => {
                tracing::warn!(repo = %repo_name, url = %url, status = response.status(),
                    class = class.as_str(), "non-200 from repo");
                last_err = Some(ButlerError::Transport {
                    url,
                    status: response.status(),
                    detail: "unexpected status".into(),
                });
            }
            Err(e) => {
                tracing::warn!(repo = %repo_name, url = %url, error = %e,
                    class = class.as_str(), "repo fetch failed");
                last_err = Some(e);
            }
        }
    }

    metrics::set_remote_repo_up(&manager.name, false);
    Err(last_err.unwrap_or_else(|| ButlerError::Transport {
        url: file.to_string(),
        status: 504,
        detail: "no repos configured".into(),
    }))
}

/// Step 4: compare every staged buffer to its on-disk counterpart and
/// return the paths that differ.
async fn diff(staged: &BTreeMap<PathBuf, Bytes>) -> Vec<PathBuf> {
    let mut changed = Vec::new();
    for (path, data) in staged {
        match tokio::fs::read(path).await {
            Ok(disk) if disk == *data => {}
            // Absent or unreadable counts as different; first runs must
            // still write.
            _ => changed.push(path.clone()),
        }
    }
    changed
}

/// Step 5: write-temp-then-rename every differing file, then remove
/// foreign files when `clean-files` is set. A filesystem fault here
/// aborts the pass and rolls back from the snapshot when one exists.
async fn swap(
    manager: &Manager,
    state: &ManagerState,
    staged: &BTreeMap<PathBuf, Bytes>,
    changed: &[PathBuf],
) -> Result<(), ButlerError> {
    for path in changed {
        if let Err(e) = cache::write_atomic(path, &staged[path]).await {
            tracing::error!(path = %path.display(), error = %e, "swap failed, attempting rollback");
            if manager.enable_cache && state.good_cache() {
                let snapshot = state.snapshot();
                cache::restore(&snapshot, &manager.dest_path, manager.clean_files, &manager.name)
                    .await;
            }
            return Err(ButlerError::Io(e));
        }
    }

    if manager.clean_files {
        for path in cache::walk_files(&manager.dest_path) {
            if !staged.contains_key(&path) {
                tracing::info!(path = %path.display(), "removing foreign file");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e,
                        "could not remove foreign file");
                }
            }
        }
    }

    Ok(())
}

/// Steps 6–7: reload and record the outcome.
///
/// Success snapshots the destination (when caching is enabled) and marks
/// the manager ok. A tolerated timeout leaves no opinion: the reload may
/// have landed, so neither rollback nor a positive status is recorded.
/// Any other failure restores the known-good snapshot and marks the
/// manager failed. Status-file write failures propagate as fatal.
async fn reload_and_record(
    manager: &Manager,
    state: &ManagerState,
    status: &StatusFile,
) -> Result<(), ButlerError> {
    let result = Reloader::from_config(&manager.reloader)
        .reload(&manager.name)
        .await;
    state.set_reload_pending(false);

    match result {
        Ok(()) => {
            if manager.enable_cache {
                let snapshot = cache::take(
                    &manager.all_dest_paths(),
                    manager.cache_path.as_deref(),
                    &manager.name,
                )
                .await;
                state.store_snapshot(snapshot);
            }
            status.set(&manager.name, true).await?;
            metrics::set_reload(&manager.name, true);
            Ok(())
        }
        Err(e) if e.is_timeout() && manager.manager_timeout_ok => {
            tracing::debug!(code = e.failure.code(),
                "reload timed out but manager-timeout-ok is set, ignoring");
            metrics::delete_reload(&manager.name);
            Ok(())
        }
        Err(e) => {
            tracing::error!(code = e.failure.code(), error = %e, "reload failed");
            if manager.enable_cache && state.good_cache() {
                let snapshot = state.snapshot();
                cache::restore(&snapshot, &manager.dest_path, manager.clean_files, &manager.name)
                    .await;
            }
            status.set(&manager.name, false).await?;
            metrics::set_reload(&manager.name, false);
            Err(e.into())
        }
    }
}
