//! Operator notifications waiting for delivery.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How loudly a failure is announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }
}

/// A notification owned by the delivery queue until it is sent or exhausted.
///
/// Retries never mutate a record in place; [`PendingNotification::with_attempt`]
/// produces the replacement value that goes back into the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub id: Uuid,
    pub created_at: DateTime<Local>,
    pub severity: Severity,
    pub summary: String,

    /// Full error chain, truncated when formatted
    pub detail: Option<String>,

    /// Where the failure happened
    pub context: Option<String>,

    /// Failed delivery attempts so far
    pub attempts: u32,
}

impl PendingNotification {
    pub fn new(severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Local::now(),
            severity,
            summary: summary.into(),
            detail: None,
            context: None,
            attempts: 0,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Copy of this record after one more failed attempt
    pub fn with_attempt(&self) -> Self {
        Self {
            attempts: self.attempts + 1,
            ..self.clone()
        }
    }
}
