//! Resumption checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest fully processed update id, the sole resumption token.
///
/// Serialized as `{"lastProcessedUpdateId": .., "lastUpdated": ..}` so the
/// state file stays readable and compatible with existing installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "lastProcessedUpdateId")]
    pub last_processed_id: i64,

    #[serde(rename = "lastUpdated")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            last_processed_id: 0,
            updated_at: Utc::now(),
        }
    }
}

impl Checkpoint {
    /// First update id to request when resuming from this checkpoint
    pub fn next_offset(&self) -> i64 {
        self.last_processed_id + 1
    }

    /// Record `id` as processed. Never moves backwards.
    pub fn advance(&mut self, id: i64) {
        if id > self.last_processed_id {
            self.last_processed_id = id;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.advance(7);
        checkpoint.advance(3);

        assert_eq!(checkpoint.last_processed_id, 7);
        assert_eq!(checkpoint.next_offset(), 8);
    }

    #[test]
    fn test_serialized_field_names() {
        let checkpoint = Checkpoint {
            last_processed_id: 42,
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["lastProcessedUpdateId"], 42);
        assert!(json.get("lastUpdated").is_some());
    }
}
