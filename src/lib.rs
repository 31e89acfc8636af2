//! tg-archiver - Telegram to Markdown archiver
//!
//! Polls a Telegram bot for messages and appends them to per-day Markdown
//! notes, downloading attached media and transcribing voice messages.
//!
//! # Architecture
//!
//! The system is built around a checkpointed polling loop:
//! - Updates are processed in ascending id order
//! - The checkpoint is persisted after each batch (at-least-once)
//! - A failed message is reported and skipped, never retried in place
//! - Failures reach the operator through a bounded, retrying delivery queue
//!
//! # Modules
//!
//! - `adapters`: Remote message source (Telegram Bot API)
//! - `archive`: Markdown rendering and day-file storage
//! - `core`: Orchestrator and checkpoint store
//! - `domain`: Data structures (Update, Message, Checkpoint, notifications)
//! - `ingest`: Media download and transcription
//! - `notify`: Operator notification delivery
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Archive until Ctrl+C
//! tg-archiver run
//!
//! # Show the checkpoint and today's notes file
//! tg-archiver status
//! ```

pub mod adapters;
pub mod archive;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod notify;

// Re-export main types at crate root for convenience
pub use core::{CheckpointStore, Orchestrator, PollOutcome, PollSettings, PollState};
pub use domain::{Checkpoint, Message, MessageContent, PendingNotification, Severity, Update};
pub use notify::{DeliveryQueue, DeliverySettings, DeliveryStats};

// Telegram integration
pub use adapters::{MessageSource, TelegramClient, TelegramConfig};
