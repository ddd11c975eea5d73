//! Install lock.
//!
//! The marker file's existence is the only record that this deployment has been
//! installed. It carries no payload.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("install lock already exists: {0:?}")]
    AlreadyExists(PathBuf),
    #[error("failed to create install lock {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait InstallLock: Send + Sync {
    /// Whether the marker is present. A marker that cannot be checked counts
    /// as present.
    async fn exists(&self) -> bool;

    /// Create the marker. Fails with `AlreadyExists` if it is already there.
    async fn create(&self) -> Result<(), LockError>;
}

/// File-backed lock using create-new semantics, so two processes racing to
/// create it cannot both succeed.
#[derive(Debug, Clone)]
pub struct FileInstallLock {
    path: PathBuf,
}

impl FileInstallLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InstallLock for FileInstallLock {
    async fn exists(&self) -> bool {
        let present = match tokio::fs::try_exists(&self.path).await {
            Ok(present) => present,
            Err(e) => {
                warn!(
                    "[PHASE: install] [STEP: lock] lock state unreadable, treating as installed (path={:?}, error={})",
                    self.path, e
                );
                true
            }
        };
        debug!(
            "[PHASE: install] [STEP: lock] lock check (path={:?}, present={})",
            self.path, present
        );
        present
    }

    async fn create(&self) -> Result<(), LockError> {
        let io_err = |source| LockError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await;

        match file {
            Ok(f) => {
                f.sync_all().await.map_err(io_err)?;
                info!(
                    "[PHASE: install] [STEP: lock] install lock created (path={:?})",
                    self.path
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(LockError::AlreadyExists(self.path.clone()))
            }
            Err(e) => Err(io_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = FileInstallLock::new(dir.path().join("data").join("install.lock"));

        assert!(!lock.exists().await);
        lock.create().await.expect("create");
        assert!(lock.exists().await);

        let meta = std::fs::metadata(lock.path()).expect("metadata");
        assert_eq!(meta.len(), 0, "lock carries no payload");
    }

    #[tokio::test]
    async fn second_create_reports_already_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = FileInstallLock::new(dir.path().join("install.lock"));

        lock.create().await.expect("first create");
        let err = lock.create().await.unwrap_err();
        assert!(matches!(err, LockError::AlreadyExists(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn unwritable_location_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Parent "directory" is a regular file.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").expect("write blocker");
        let lock = FileInstallLock::new(blocker.join("install.lock"));

        let err = lock.create().await.unwrap_err();
        assert!(matches!(err, LockError::Io { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn uncheckable_lock_counts_as_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Stat on a path below a regular file fails with something other than NotFound.
        let blocker = dir.path().join("data");
        std::fs::write(&blocker, b"x").expect("write blocker");
        let lock = FileInstallLock::new(blocker.join("install.lock"));

        assert!(lock.exists().await);
    }
}
