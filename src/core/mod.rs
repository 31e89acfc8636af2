//! Core ingestion logic.
//!
//! This module contains:
//! - Checkpoint: Durable resumption state and its single-writer lock
//! - Orchestrator: The polling loop

pub mod checkpoint;
pub mod orchestrator;

// Re-export commonly used types
pub use checkpoint::{CheckpointError, CheckpointLock, CheckpointStore};
pub use orchestrator::{Orchestrator, PollOutcome, PollSettings, PollState};
