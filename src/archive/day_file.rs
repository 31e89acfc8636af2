//! Append-only day-files.
//!
//! One Markdown file per local calendar date. Blocks are only ever appended;
//! nothing here rewrites or truncates an existing file.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::config::paths::ArchivePaths;

/// Errors that can occur while writing the archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writer for the per-day archive files
#[derive(Debug, Clone)]
pub struct DayArchive {
    paths: ArchivePaths,
}

impl DayArchive {
    pub fn new(paths: ArchivePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ArchivePaths {
        &self.paths
    }

    /// Create the notes root and media directory
    pub async fn ensure_directories(&self) -> Result<(), ArchiveError> {
        for dir in [self.paths.notes_root.clone(), self.paths.media_dir()] {
            if !dir.exists() {
                create_dir(&dir).await?;
                tracing::info!(path = %dir.display(), "Created archive directory");
            }
        }
        Ok(())
    }

    /// Append a rendered block to the day-file for `date`
    pub async fn append(&self, date: NaiveDate, content: &str) -> Result<PathBuf, ArchiveError> {
        let path = self.paths.day_file(date);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                create_dir(parent).await?;
            }
        }

        let append_err = |source| ArchiveError::Append {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(append_err)?;

        file.write_all(content.as_bytes()).await.map_err(append_err)?;
        file.flush().await.map_err(append_err)?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "Appended archive block");
        Ok(path)
    }
}

async fn create_dir(path: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| ArchiveError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn archive(temp: &TempDir) -> DayArchive {
        DayArchive::new(ArchivePaths::new(
            temp.path().join("notes"),
            "media",
            temp.path().join("state.json"),
        ))
    }

    #[tokio::test]
    async fn test_ensure_directories_creates_root_and_media() {
        let temp = TempDir::new().unwrap();
        let archive = archive(&temp);

        archive.ensure_directories().await.unwrap();

        assert!(temp.path().join("notes").is_dir());
        assert!(temp.path().join("notes/media").is_dir());
    }

    #[tokio::test]
    async fn test_append_creates_parent_and_preserves_order() {
        let temp = TempDir::new().unwrap();
        let archive = archive(&temp);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let path = archive.append(date, "first\n").await.unwrap();
        archive.append(date, "second\n").await.unwrap();

        assert!(path.ends_with("Telegram-2024-01-02_Notes.md"));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
