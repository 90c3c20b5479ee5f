//! Temp scope lifecycle.
//!
//! Every request owns one directory under the workspace root, named by
//! its request id. Artifacts only ever exist inside their scope, so
//! releasing a request is one recursive delete, and crash leftovers are
//! recognizable by name during the startup sweep.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use vidferry_core::{RequestId, SessionError, SessionResult};

/// Owns on-disk temp scopes for all requests.
///
/// Disposal is idempotent and never propagates OS errors; a scope that
/// cannot be removed now is logged and picked up by a later sweep.
#[derive(Debug, Clone)]
pub struct TempFileArena {
    root: PathBuf,
}

impl TempFileArena {
    /// Create an arena rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory that holds all scopes.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a request's scope lives, whether or not it exists yet.
    #[must_use]
    pub fn scope_path(&self, id: RequestId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Create the scope directory for a request.
    pub async fn allocate(&self, id: RequestId) -> SessionResult<PathBuf> {
        let path = self.scope_path(id);
        fs::create_dir_all(&path).await.map_err(|e| {
            SessionError::internal(format!("create scope {}: {e}", path.display()))
        })?;
        tracing::debug!(request_id = %id, path = %path.display(), "temp scope allocated");
        Ok(path)
    }

    /// Remove a request's scope and everything under it.
    ///
    /// Safe to call any number of times, including for requests that
    /// never allocated.
    pub async fn dispose(&self, id: RequestId) {
        let path = self.scope_path(id);
        match fs::remove_dir_all(&path).await {
            Ok(()) => {
                tracing::debug!(request_id = %id, "temp scope removed");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    request_id = %id,
                    path = %path.display(),
                    error = %e,
                    "failed to remove temp scope"
                );
            }
        }
    }

    /// Remove scopes whose directories are older than `grace`.
    ///
    /// Run once at startup to reclaim space from requests that died with
    /// the process. Only directories whose names parse as request ids are
    /// touched; anything else under the root is left alone.
    pub async fn sweep_stale(&self, grace: Duration) -> usize {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "sweep could not read root");
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<RequestId>().ok())
            else {
                continue;
            };
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|t| t.elapsed().ok())
                .unwrap_or_default();
            if age < grace {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    tracing::info!(request_id = %id, age_secs = age.as_secs(), "stale scope swept");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(request_id = %id, error = %e, "failed to sweep stale scope");
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_then_dispose() {
        let dir = tempfile::tempdir().unwrap();
        let arena = TempFileArena::new(dir.path());
        let id = RequestId::new();

        let scope = arena.allocate(id).await.unwrap();
        assert!(scope.is_dir());
        assert_eq!(scope, arena.scope_path(id));

        tokio::fs::write(scope.join("artifact.mp4"), b"bytes")
            .await
            .unwrap();

        arena.dispose(id).await;
        assert!(!scope.exists());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let arena = TempFileArena::new(dir.path());
        let id = RequestId::new();

        arena.allocate(id).await.unwrap();
        arena.dispose(id).await;
        arena.dispose(id).await; // Second call must be a quiet no-op

        let never_allocated = RequestId::new();
        arena.dispose(never_allocated).await;
    }

    #[tokio::test]
    async fn test_sweep_removes_scopes_past_grace() {
        let dir = tempfile::tempdir().unwrap();
        let arena = TempFileArena::new(dir.path());
        arena.allocate(RequestId::new()).await.unwrap();
        arena.allocate(RequestId::new()).await.unwrap();

        // Zero grace treats everything as stale.
        let removed = arena.sweep_stale(Duration::ZERO).await;
        assert_eq!(removed, 2);
        assert_eq!(arena.sweep_stale(Duration::ZERO).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let arena = TempFileArena::new(dir.path());
        let id = RequestId::new();
        arena.allocate(id).await.unwrap();

        let removed = arena.sweep_stale(Duration::from_secs(3600)).await;
        assert_eq!(removed, 0);
        assert!(arena.scope_path(id).is_dir());
    }

    #[tokio::test]
    async fn test_sweep_ignores_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let arena = TempFileArena::new(dir.path());

        tokio::fs::create_dir(dir.path().join("not-a-request"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"keep me")
            .await
            .unwrap();

        let removed = arena.sweep_stale(Duration::ZERO).await;
        assert_eq!(removed, 0);
        assert!(dir.path().join("not-a-request").is_dir());
        assert!(dir.path().join("notes.txt").is_file());
    }

    #[tokio::test]
    async fn test_sweep_of_missing_root_is_quiet() {
        let arena = TempFileArena::new("/definitely/not/here");
        assert_eq!(arena.sweep_stale(Duration::ZERO).await, 0);
    }
}
