//! Operator notifications.
//!
//! - `queue`: bounded delivery queue with a background retry sweep
//! - `format`: length-bounded message formatting

pub mod format;
pub mod queue;

pub use format::format_notification;
pub use queue::{DeliveryQueue, DeliverySettings, DeliveryStats};
