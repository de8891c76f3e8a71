//! Last-known-good snapshot cache.
//!
//! A [`Snapshot`] captures the exact bytes of a manager's destination
//! files as of the last successful reload. [`restore`] rewrites the
//! destination from it after a failed reload. A snapshot is only taken
//! after a reload succeeds, so a failing reload can never replace a
//! known-good set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Byte contents of all primary + additional files for one manager.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: BTreeMap<PathBuf, Bytes>,
}

impl Snapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// Write a file via temp-then-rename so readers never observe a torn
/// state. The temp file lives next to the target so the rename stays on
/// one filesystem.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    });
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Capture the current bytes of `paths`. Missing files are simply absent
/// from the snapshot. When `mirror` is set the bytes are also written
/// below it (best effort) so operators can inspect the known-good set.
pub async fn take(paths: &[PathBuf], mirror: Option<&Path>, manager: &str) -> Snapshot {
    let mut files = BTreeMap::new();

    for path in paths {
        match tokio::fs::read(path).await {
            Ok(data) => {
                files.insert(path.clone(), Bytes::from(data));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(manager = %manager, path = %path.display(), error = %e,
                    "could not snapshot file");
            }
        }
    }

    if let Some(mirror_root) = mirror {
        let dir = mirror_root.join(manager);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(manager = %manager, error = %e, "could not create cache mirror dir");
        } else {
            for (path, data) in &files {
                let target = dir.join(path.file_name().unwrap_or_default());
                if let Err(e) = tokio::fs::write(&target, data).await {
                    tracing::warn!(manager = %manager, path = %target.display(), error = %e,
                        "could not mirror snapshot file");
                }
            }
        }
    }

    tracing::debug!(manager = %manager, files = files.len(), "snapshot taken");
    Snapshot { files }
}

/// Rewrite the destination from a snapshot. Best-effort atomic per file;
/// proceeds past individual failures and returns every error. When
/// `clean_files` is set, files below `dest_dir` that are not in the
/// snapshot are deleted.
pub async fn restore(
    snapshot: &Snapshot,
    dest_dir: &Path,
    clean_files: bool,
    manager: &str,
) -> Vec<(PathBuf, std::io::Error)> {
    let mut errors = Vec::new();

    for (path, data) in &snapshot.files {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                errors.push((path.clone(), e));
                continue;
            }
        }
        if let Err(e) = write_atomic(path, data).await {
            errors.push((path.clone(), e));
        }
    }

    if clean_files {
        for entry in walk_files(dest_dir) {
            if !snapshot.contains(&entry) {
                tracing::info!(manager = %manager, path = %entry.display(),
                    "removing file not present in known-good snapshot");
                if let Err(e) = tokio::fs::remove_file(&entry).await {
                    errors.push((entry, e));
                }
            }
        }
    }

    for (path, e) in &errors {
        tracing::error!(manager = %manager, path = %path.display(), error = %e,
            "restore from snapshot failed for file");
    }
    errors
}

/// All regular files below `root`, iteratively (no async recursion).
pub(crate) fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => stack.push(path),
                Ok(t) if t.is_file() => files.push(path),
                _ => {}
            }
        }
    }
    files
}
