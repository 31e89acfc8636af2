//! Media acquisition.
//!
//! Downloads the file attached to a media message into the media directory
//! under a collision-free name. Failures never propagate: they are reported
//! and the message is archived without media.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::adapters::MessageSource;
use crate::domain::{FileMeta, Message, MessageContent, MessageKind};
use crate::notify::DeliveryQueue;

const REPORT_CONTEXT: &str = "media.acquire";

/// Fetches media for messages and stores it locally
pub struct MediaAcquirer {
    source: Arc<dyn MessageSource>,
    media_dir: PathBuf,
    reporter: Arc<DeliveryQueue>,
}

impl MediaAcquirer {
    pub fn new(source: Arc<dyn MessageSource>, media_dir: PathBuf, reporter: Arc<DeliveryQueue>) -> Self {
        Self {
            source,
            media_dir,
            reporter,
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Download and store the message's file, returning the stored file name
    pub async fn acquire(&self, message: &Message) -> Option<String> {
        let Some(file) = message.content.file() else {
            tracing::warn!(message_id = message.id, kind = %message.kind(), "Media message has no file reference");
            self.reporter.error(
                &anyhow::anyhow!("{} message {} has no file reference", message.kind(), message.id),
                Some(REPORT_CONTEXT),
            );
            return None;
        };

        // Metadata only refines the extension; a failed lookup is not fatal
        let meta = match self.source.get_file_meta(&file.file_id).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!(file_id = %file.file_id, error = %e, "File metadata unavailable");
                None
            }
        };

        let bytes = match self.source.download_file(&file.file_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file_id = %file.file_id, "Failed to download file");
                self.reporter.error(
                    &e.context(format!("Failed to download file {}", file.file_id)),
                    Some(REPORT_CONTEXT),
                );
                return None;
            }
        };

        let candidate = candidate_file_name(message, meta.as_ref(), Local::now());

        match self.store(&bytes, &candidate).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                self.reporter.error(&e, Some(REPORT_CONTEXT));
                None
            }
        }
    }

    /// Write bytes under a unique name derived from `candidate`
    async fn store(&self, bytes: &[u8], candidate: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .with_context(|| format!("Failed to create media directory: {}", self.media_dir.display()))?;

        let file_name = unique_file_name(&self.media_dir, candidate, Local::now());
        let path = self.media_dir.join(&file_name);

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to save media file {}", path.display()))?;

        tracing::info!(file = %file_name, size = bytes.len(), "Saved media file");
        Ok(file_name)
    }
}

/// Pick a destination name inside `dir`.
///
/// Returns `candidate` unchanged when no such file exists, otherwise appends a
/// second-resolution timestamp before the extension. Two saves of the same
/// name within one second can still collide.
pub fn unique_file_name(dir: &Path, candidate: &str, now: DateTime<Local>) -> String {
    if !dir.join(candidate).exists() {
        return candidate.to_string();
    }

    let (stem, extension) = split_extension(candidate);
    format!("{}_{}{}", stem, now.format("%Y%m%d%H%M%S"), extension)
}

/// Name a media file from the sender's file name or the message kind
pub fn candidate_file_name(message: &Message, meta: Option<&FileMeta>, now: DateTime<Local>) -> String {
    if let Some(name) = message.content.original_file_name().and_then(sanitize_file_name) {
        return name;
    }

    let kind = message.kind();
    let extension = match &message.content {
        MessageContent::Photo { .. } => ".jpg".to_string(),
        MessageContent::Video { .. } => ".mp4".to_string(),
        MessageContent::Voice { .. } => ".ogg".to_string(),
        MessageContent::Audio { .. } => ".mp3".to_string(),
        MessageContent::Document { .. } => meta
            .and_then(|m| m.file_path.as_deref())
            .map(|path| split_extension(path).1.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    };

    let base = match kind {
        MessageKind::Photo
        | MessageKind::Video
        | MessageKind::Voice
        | MessageKind::Audio
        | MessageKind::Document => kind.as_str(),
        _ => "file",
    };

    format!("{}_{}{}", base, now.format("%Y%m%d_%H%M%S"), extension)
}

/// Keep only the final path component of a sender-supplied name
fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}

/// Split `name.ext` into (`name`, `.ext`); dotfiles have no extension
fn split_extension(name: &str) -> (&str, &str) {
    let file_part_start = name.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    match name[file_part_start..].rfind('.') {
        Some(dot) if dot > 0 => name.split_at(file_part_start + dot),
        _ => (name, ""),
    }
}
