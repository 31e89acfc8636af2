//! Archive output: Markdown rendering and day-file storage.

pub mod day_file;
pub mod markdown;

pub use day_file::{ArchiveError, DayArchive};
pub use markdown::{FormatConfig, Locale, MarkdownRenderer, Renderer, BLOCK_SEPARATOR};
