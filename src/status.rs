//! Persisted per-manager health records.
//!
//! A small newline-delimited document of `name=ok` / `name=failed`
//! records. Read once at startup to seed self-heal decisions, rewritten
//! in full via write-temp-then-rename on every change so readers never
//! observe a torn state. All writes serialize on an internal mutex.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::cache::write_atomic;
use crate::error::ButlerError;

pub struct StatusFile {
    path: PathBuf,
    state: Mutex<HashMap<String, bool>>,
}

impl StatusFile {
    /// Open the status file, seeding in-memory state from an existing
    /// document. A missing or unreadable file starts empty.
    pub async fn open(path: PathBuf) -> Self {
        let mut state = HashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for line in content.lines() {
                    if let Some((name, value)) = line.split_once('=') {
                        state.insert(name.to_string(), value == "ok");
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e,
                    "could not read status file, starting empty");
            }
        }

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Last recorded health for one manager; `None` when never recorded.
    pub async fn get(&self, manager: &str) -> Option<bool> {
        self.state.lock().await.get(manager).copied()
    }

    /// Record one manager's health and rewrite the whole document.
    ///
    /// A write failure is fatal for the agent: the next tick's self-heal
    /// decision would be based on stale state.
    pub async fn set(&self, manager: &str, ok: bool) -> Result<(), ButlerError> {
        let mut state = self.state.lock().await;
        state.insert(manager.to_string(), ok);

        let mut names: Vec<&String> = state.keys().collect();
        names.sort();

        let mut doc = String::new();
        for name in names {
            let value = if state[name] { "ok" } else { "failed" };
            doc.push_str(name);
            doc.push('=');
            doc.push_str(value);
            doc.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ButlerError::StatusFile {
                        path: self.path.clone(),
                        source: e,
                    })?;
            }
        }

        write_atomic(&self.path, doc.as_bytes())
            .await
            .map_err(|e| ButlerError::StatusFile {
                path: self.path.clone(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("butler.status");

        let status = StatusFile::open(path.clone()).await;
        status.set("prom", true).await.unwrap();
        status.set("alertmanager", false).await.unwrap();

        let reopened = StatusFile::open(path.clone()).await;
        assert_eq!(reopened.get("prom").await, Some(true));
        assert_eq!(reopened.get("alertmanager").await, Some(false));
        assert_eq!(reopened.get("ghost").await, None);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "alertmanager=failed\nprom=ok\n");
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::open(dir.path().join("none.status")).await;
        assert_eq!(status.get("prom").await, None);
    }
}
