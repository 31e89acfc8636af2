//! Canonical archive paths.
//!
//! Single source of truth for where notes, media and state live - import this
//! instead of joining paths by hand.
//!
//! ## Layout
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `<notes_root>/Telegram-<date>_Notes.md` | One day-file per local date |
//! | `<notes_root>/<media_dir_name>/` | Downloaded media |
//! | `<state_file>` | Checkpoint JSON |
//! | `<state_file>.lock` | Single-writer lock |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;

/// Default media subdirectory name
pub const DEFAULT_MEDIA_DIR: &str = "media";

/// Default home directory name under the user's home
pub const HOME_DIR_NAME: &str = ".tg-archiver";

/// Resolve the archiver home (`$TG_ARCHIVER_HOME` or `~/.tg-archiver`)
pub fn default_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("TG_ARCHIVER_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(HOME_DIR_NAME))
}

/// Resolved locations of the archive and its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    pub notes_root: PathBuf,
    pub media_dir_name: String,
    pub state_file: PathBuf,
}

impl ArchivePaths {
    pub fn new(notes_root: PathBuf, media_dir_name: impl Into<String>, state_file: PathBuf) -> Self {
        Self {
            notes_root,
            media_dir_name: media_dir_name.into(),
            state_file,
        }
    }

    /// Directory holding downloaded media
    pub fn media_dir(&self) -> PathBuf {
        self.notes_root.join(&self.media_dir_name)
    }

    /// Full path of a stored media file
    pub fn media_file(&self, file_name: &str) -> PathBuf {
        self.media_dir().join(file_name)
    }

    /// Day-file for a local calendar date
    pub fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.notes_root.join(day_file_name(date))
    }

    /// Lock file guarding the state file against a second writer
    pub fn lock_file(&self) -> PathBuf {
        lock_file_for(&self.state_file)
    }
}

/// File name of the day-file for `date`
pub fn day_file_name(date: NaiveDate) -> String {
    format!("Telegram-{}_Notes.md", date.format("%Y-%m-%d"))
}

/// `<state_file>.lock`
pub fn lock_file_for(state_file: &Path) -> PathBuf {
    let mut name = state_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    state_file.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> ArchivePaths {
        ArchivePaths::new(
            PathBuf::from("/data/notes"),
            DEFAULT_MEDIA_DIR,
            PathBuf::from("/data/state.json"),
        )
    }

    #[test]
    fn test_day_file_is_named_from_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            paths().day_file(date),
            PathBuf::from("/data/notes/Telegram-2024-03-09_Notes.md")
        );
    }

    #[test]
    fn test_media_dir_is_under_notes_root() {
        assert_eq!(paths().media_dir(), PathBuf::from("/data/notes/media"));
        assert_eq!(
            paths().media_file("photo.jpg"),
            PathBuf::from("/data/notes/media/photo.jpg")
        );
    }

    #[test]
    fn test_lock_file_sits_next_to_state() {
        assert_eq!(paths().lock_file(), PathBuf::from("/data/state.json.lock"));
    }
}
