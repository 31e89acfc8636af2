//! Inbound media handling.
//!
//! 1. **Media**: downloads attached files into the media directory
//! 2. **Transcriber**: turns stored voice messages into text
//!
//! ```text
//! Message → MediaAcquirer → media/<name> → Transcriber (voice only)
//! ```

pub mod media;
pub mod transcriber;

// Re-export key types
pub use media::{candidate_file_name, unique_file_name, MediaAcquirer};
pub use transcriber::{
    is_placeholder, Transcriber, WhisperSettings, WhisperTranscriber, MODEL_UNAVAILABLE, NO_TEXT,
    SENTINEL_TRANSCRIPT,
};
