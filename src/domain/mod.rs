//! Domain types for the archiver.
//!
//! This module contains the core data structures:
//! - Message: Updates and messages pulled from the remote feed
//! - Checkpoint: The durable resumption token
//! - Notification: Operator notifications awaiting delivery

pub mod checkpoint;
pub mod message;
pub mod notification;

// Re-export commonly used types
pub use checkpoint::Checkpoint;
pub use message::{FileMeta, FileRef, Message, MessageContent, MessageKind, Update};
pub use notification::{PendingNotification, Severity};
