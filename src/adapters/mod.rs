//! Adapter interfaces for external systems.
//!
//! The archiver talks to exactly one remote: the message source. Everything
//! the orchestrator, media acquirer and delivery queue need from it goes
//! through [`MessageSource`], so tests can substitute an in-memory source.

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{FileMeta, Update};

// Re-export the Telegram adapter
pub use telegram::{TelegramClient, TelegramConfig};

/// Trait for the remote message feed
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch updates with id >= `offset`, oldest first
    async fn fetch_updates(&self, offset: i64) -> Result<Vec<Update>>;

    /// Resolve metadata for a file reference
    async fn get_file_meta(&self, file_id: &str) -> Result<Option<FileMeta>>;

    /// Download a file's bytes
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Send a plain text message to a chat
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}
