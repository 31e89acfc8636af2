//! Ingestion loop.
//!
//! Polls the message source from a cursor, archives each message and
//! checkpoints after every batch. Delivery is at-least-once: a crash between
//! appending a batch and saving the checkpoint replays that batch on restart.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::MessageSource;
use crate::archive::{DayArchive, FormatConfig, Locale, Renderer};
use crate::config::paths::ArchivePaths;
use crate::domain::{Checkpoint, Message, MessageContent, Update};
use crate::ingest::{is_placeholder, MediaAcquirer, Transcriber};
use crate::notify::DeliveryQueue;

use super::checkpoint::{CheckpointLock, CheckpointStore};

/// Polling behaviour (`polling` section of the config file)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Pause between successful polls
    pub poll_interval_ms: u64,
    /// Pause after a failed fetch
    pub retry_interval_ms: u64,
    /// Maximum updates per fetch
    pub batch_limit: u32,
    /// Server-side long-poll timeout
    pub long_poll_timeout_secs: u64,
    /// Send voice transcripts back to the chat they came from
    pub echo_transcripts: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            retry_interval_ms: 5000,
            batch_limit: 100,
            long_poll_timeout_secs: 10,
            echo_transcripts: true,
        }
    }
}

impl PollSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs)
    }
}

/// In-memory position of the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    /// Next update id to request
    pub cursor: i64,
    pub checkpoint: Checkpoint,
}

impl PollState {
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            cursor: checkpoint.next_offset(),
            checkpoint,
        }
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A batch was processed and checkpointed
    Processed { count: usize, last_id: i64 },
    /// The source had nothing new
    Idle,
    /// The fetch failed; position unchanged
    TransportFailed,
}

/// Checkpointed polling loop that archives incoming messages
pub struct Orchestrator {
    source: Arc<dyn MessageSource>,
    transcriber: Arc<dyn Transcriber>,
    renderer: Arc<dyn Renderer>,
    archive: DayArchive,
    media: MediaAcquirer,
    checkpoints: CheckpointStore,
    reporter: Arc<DeliveryQueue>,
    settings: PollSettings,
    /// Decides which day-file a message belongs to
    format: FormatConfig,
    lock: Option<CheckpointLock>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn MessageSource>,
        transcriber: Arc<dyn Transcriber>,
        renderer: Arc<dyn Renderer>,
        paths: ArchivePaths,
        reporter: Arc<DeliveryQueue>,
        settings: PollSettings,
    ) -> Self {
        let media = MediaAcquirer::new(Arc::clone(&source), paths.media_dir(), Arc::clone(&reporter));
        let format = FormatConfig::new(Locale::default(), paths.media_dir_name.clone());

        Self {
            source,
            transcriber,
            renderer,
            checkpoints: CheckpointStore::new(paths.state_file.clone()),
            archive: DayArchive::new(paths),
            media,
            reporter,
            settings,
            format,
            lock: None,
        }
    }

    /// Use the renderer's time zone when picking day-files
    pub fn with_format(mut self, format: FormatConfig) -> Self {
        self.format = format;
        self
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Prepare directories, take the state lock and load the checkpoint
    pub async fn start(&mut self) -> Result<PollState> {
        self.archive
            .ensure_directories()
            .await
            .context("Failed to prepare archive directories")
            .map_err(|e| self.fatal(e))?;

        if self.lock.is_none() {
            let lock = self
                .checkpoints
                .lock()
                .context("Failed to lock checkpoint")
                .map_err(|e| self.fatal(e))?;
            debug!(lock = %lock.path().display(), "Checkpoint lock acquired");
            self.lock = Some(lock);
        }

        let checkpoint = self
            .checkpoints
            .load()
            .await
            .context("Failed to load checkpoint")
            .map_err(|e| self.fatal(e))?;

        let state = PollState::from_checkpoint(checkpoint);
        info!(
            cursor = state.cursor,
            notes_root = %self.archive.paths().notes_root.display(),
            "Archiver ready"
        );
        Ok(state)
    }

    fn fatal(&self, error: anyhow::Error) -> anyhow::Error {
        self.reporter.critical(&error, Some("orchestrator.start"));
        error
    }

    /// Start, then poll until `cancel` fires.
    ///
    /// Cancellation interrupts a fetch or a wait, never a message being
    /// archived.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let mut state = self.start().await?;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = self.source.fetch_updates(state.cursor) => fetched,
            };

            let wait = match self.handle_fetch(&mut state, fetched).await {
                PollOutcome::TransportFailed => self.settings.retry_interval(),
                PollOutcome::Idle | PollOutcome::Processed { .. } => self.settings.poll_interval(),
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(
            last_processed_id = state.checkpoint.last_processed_id,
            "Archiver stopped"
        );
        Ok(())
    }

    /// One fetch-process-checkpoint cycle
    pub async fn poll_once(&self, state: &mut PollState) -> PollOutcome {
        let fetched = self.source.fetch_updates(state.cursor).await;
        self.handle_fetch(state, fetched).await
    }

    async fn handle_fetch(&self, state: &mut PollState, fetched: Result<Vec<Update>>) -> PollOutcome {
        let mut updates = match fetched {
            Ok(updates) => updates,
            Err(e) => {
                warn!(cursor = state.cursor, "Fetching updates failed");
                self.reporter.error(
                    &e.context(format!("Failed to fetch updates from offset {}", state.cursor)),
                    Some("orchestrator.poll"),
                );
                return PollOutcome::TransportFailed;
            }
        };

        if updates.is_empty() {
            return PollOutcome::Idle;
        }

        updates.sort_by_key(|update| update.id);
        let count = updates.len();
        debug!(count, cursor = state.cursor, "Processing batch");

        for update in &updates {
            match &update.message {
                Some(message) => self.process_message(message).await,
                None => debug!(update_id = update.id, "Update carries no message, skipping"),
            }
            state.cursor = update.id + 1;
        }

        let last_id = state.cursor - 1;
        state.checkpoint.advance(last_id);

        if let Err(e) = self.checkpoints.save(&state.checkpoint).await {
            error!(last_id, error = %e, "Failed to persist checkpoint");
            self.reporter.error(
                &anyhow::Error::new(e).context("Failed to persist checkpoint"),
                Some("orchestrator.checkpoint"),
            );
        }

        PollOutcome::Processed { count, last_id }
    }

    /// Archive one message. Failures are reported and swallowed.
    #[instrument(skip(self, message), fields(message_id = message.id, kind = %message.kind()))]
    pub async fn process_message(&self, message: &Message) {
        match self.archive_message(message).await {
            Ok(path) => info!(file = %path.display(), "Message archived"),
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to archive message");
                self.reporter.error(
                    &e.context(format!("Failed to archive message {}", message.id)),
                    Some("orchestrator.process_message"),
                );
            }
        }
    }

    async fn archive_message(&self, message: &Message) -> Result<PathBuf> {
        let media_file = if message.kind().carries_media() {
            self.media.acquire(message).await
        } else {
            None
        };

        let transcript = match (&message.content, media_file.as_deref()) {
            (MessageContent::Voice { .. }, Some(file_name)) => {
                let audio = self.archive.paths().media_file(file_name);
                let transcript = self.transcriber.transcribe(&audio).await;
                self.echo_transcript(message, &transcript).await;
                Some(transcript)
            }
            _ => None,
        };

        let block = self
            .renderer
            .render(
                message,
                media_file.as_deref(),
                transcript.as_deref(),
                message.reply_to.as_deref(),
            )
            .context("Failed to render message")?;

        let date = self.format.local_time(message.timestamp).date_naive();
        let path = self.archive.append(date, &block).await?;
        Ok(path)
    }

    /// Best effort: a failed echo is only logged
    async fn echo_transcript(&self, message: &Message, transcript: &str) {
        if !self.settings.echo_transcripts || transcript.is_empty() || is_placeholder(transcript) {
            return;
        }

        if let Err(e) = self.source.send_text(message.chat_id, transcript).await {
            warn!(chat_id = message.chat_id, error = %e, "Failed to echo transcript");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_settings_defaults() {
        let settings = PollSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.retry_interval(), Duration::from_secs(5));
        assert_eq!(settings.batch_limit, 100);
        assert!(settings.echo_transcripts);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let settings: PollSettings = serde_yaml::from_str("batch_limit: 10").unwrap();
        assert_eq!(settings.batch_limit, 10);
        assert_eq!(settings.retry_interval_ms, 5000);
    }

    #[test]
    fn test_state_resumes_after_checkpoint() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.advance(4);

        let state = PollState::from_checkpoint(checkpoint);
        assert_eq!(state.cursor, 5);
    }
}
