//! Durable checkpoint storage.
//!
//! The checkpoint is a small JSON file replaced atomically on every save
//! (write to a sibling temp file, then rename). A sidecar `.lock` file held
//! with an exclusive advisory lock keeps a second archiver from advancing the
//! same checkpoint.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tokio::fs;

use crate::config::paths::lock_file_for;
use crate::domain::Checkpoint;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint {0} is locked by another archiver")]
    Locked(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Exclusive hold on a state file, released on drop
#[derive(Debug)]
pub struct CheckpointLock {
    file: File,
    path: PathBuf,
}

impl CheckpointLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::debug!(path = %self.path.display(), error = %e, "Failed to release checkpoint lock");
        }
    }
}

/// Loads and saves the checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint.
    ///
    /// A missing file yields the zero checkpoint. So does an unparseable one,
    /// after a warning: the archiver restarts from the oldest retained update
    /// rather than refusing to run. Other I/O failures are returned.
    pub async fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No checkpoint yet, starting from the beginning");
                return Ok(Checkpoint::default());
            }
            Err(e) => return Err(io_error(&self.path)(e)),
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                tracing::info!(
                    last_processed_id = checkpoint.last_processed_id,
                    "Loaded checkpoint"
                );
                Ok(checkpoint)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt checkpoint, starting from the beginning");
                Ok(Checkpoint::default())
            }
        }
    }

    /// Persist the checkpoint, replacing the previous file atomically
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }

        let json = serde_json::to_string_pretty(checkpoint)?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, json)
            .await
            .map_err(io_error(&temp_path))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(io_error(&self.path))?;

        tracing::debug!(
            last_processed_id = checkpoint.last_processed_id,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Take the single-writer lock for this state file without blocking
    pub fn lock(&self) -> Result<CheckpointLock, CheckpointError> {
        let lock_path = lock_file_for(&self.path);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(io_error(&lock_path))?;

        file.try_lock_exclusive()
            .map_err(|_| CheckpointError::Locked(self.path.clone()))?;

        Ok(CheckpointLock {
            file,
            path: lock_path,
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_zero() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path().join("state.json"));

        assert_eq!(store.load().await.unwrap().last_processed_id, 0);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path().join("nested").join("state.json"));

        let mut checkpoint = Checkpoint::default();
        checkpoint.advance(7);
        store.save(&checkpoint).await.unwrap();

        assert_eq!(store.load().await.unwrap().last_processed_id, 7);
        assert!(!temp.path().join("nested").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_zero() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = CheckpointStore::new(&path);
        assert_eq!(store.load().await.unwrap().last_processed_id, 0);
    }

    #[tokio::test]
    async fn test_reads_existing_state_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        tokio::fs::write(
            &path,
            r#"{"lastProcessedUpdateId": 123456, "lastUpdated": "2024-05-06T07:08:09Z"}"#,
        )
        .await
        .unwrap();

        let store = CheckpointStore::new(&path);
        assert_eq!(store.load().await.unwrap().last_processed_id, 123456);
    }

    #[test]
    fn test_second_lock_is_refused() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path().join("state.json"));

        let first = store.lock().unwrap();
        assert!(matches!(store.lock(), Err(CheckpointError::Locked(_))));

        drop(first);
        assert!(store.lock().is_ok());
    }
}
