//! Delivery Queue Integration Tests
//!
//! Capacity, retry and shutdown behavior of the operator notification queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use tg_archiver::adapters::MessageSource;
use tg_archiver::domain::{FileMeta, Severity, Update};
use tg_archiver::notify::{DeliveryQueue, DeliverySettings, DeliveryStats};

/// Operator chat that can be switched between reachable and unreachable
#[derive(Default)]
struct OperatorChat {
    down: AtomicBool,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

impl OperatorChat {
    fn unreachable() -> Arc<Self> {
        let chat = Self::default();
        chat.down.store(true, Ordering::SeqCst);
        Arc::new(chat)
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSource for OperatorChat {
    async fn fetch_updates(&self, _offset: i64) -> Result<Vec<Update>> {
        Ok(Vec::new())
    }

    async fn get_file_meta(&self, _file_id: &str) -> Result<Option<FileMeta>> {
        Ok(None)
    }

    async fn download_file(&self, _file_id: &str) -> Result<Vec<u8>> {
        anyhow::bail!("operator chat has no files")
    }

    async fn send_text(&self, _chat_id: i64, text: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("Bad Gateway");
        }
        self.delivered.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Settings with the background sweep pushed out of the test's way
fn manual_settings() -> DeliverySettings {
    DeliverySettings {
        warmup_ms: 3_600_000,
        retry_interval_ms: 3_600_000,
        ..Default::default()
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_overflow_drops_newest() {
    let chat = OperatorChat::unreachable();
    let queue = DeliveryQueue::new(
        DeliverySettings {
            max_queue_size: 2,
            ..manual_settings()
        },
        chat.clone(),
        1,
    );

    queue.report(Severity::Error, "first", None, None);
    queue.report(Severity::Error, "second", None, None);
    queue.report(Severity::Error, "third", None, None);
    settle().await;

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.stats().overflowed, 1);

    let summaries: Vec<String> = queue.pending().into_iter().map(|n| n.summary).collect();
    assert_eq!(summaries, vec!["first", "second"]);
}

#[tokio::test]
async fn test_attempts_are_capped() {
    let chat = OperatorChat::unreachable();
    let queue = DeliveryQueue::new(manual_settings(), chat.clone(), 1);

    queue.report(Severity::Critical, "disk full", None, Some("test"));
    settle().await;
    assert_eq!(chat.attempts(), 1);

    queue.sweep().await;
    assert_eq!(chat.attempts(), 2);
    assert_eq!(queue.len(), 1);

    queue.sweep().await;
    assert_eq!(chat.attempts(), 3);
    assert!(queue.is_empty());

    // Nothing left to retry
    queue.sweep().await;
    assert_eq!(chat.attempts(), 3);
    assert_eq!(
        queue.stats(),
        DeliveryStats {
            sent: 0,
            overflowed: 0,
            exhausted: 1,
        }
    );
}

#[tokio::test]
async fn test_disabled_queue_never_sends() {
    let chat = Arc::new(OperatorChat::default());
    let queue = DeliveryQueue::new(
        DeliverySettings {
            enabled: false,
            ..manual_settings()
        },
        chat.clone(),
        1,
    );

    for i in 0..5 {
        queue.report(Severity::Error, format!("failure {}", i), None, None);
    }
    settle().await;
    queue.sweep().await;

    assert_eq!(chat.attempts(), 0);
    assert!(queue.is_empty());
    assert!(!queue.is_sweep_armed());
}

#[tokio::test]
async fn test_delivered_notification_carries_error_chain() {
    let chat = Arc::new(OperatorChat::default());
    let queue = DeliveryQueue::new(manual_settings(), chat.clone(), 1);

    let error = anyhow::anyhow!("permission denied").context("Failed to append to day-file");
    queue.error(&error, Some("orchestrator.process_message"));
    settle().await;

    let delivered = chat.delivered();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].starts_with("❌ **ERROR**"));
    assert!(delivered[0].contains("**Context:** orchestrator.process_message"));
    assert!(delivered[0].contains("**Error:** Failed to append to day-file"));
    assert!(delivered[0].contains("permission denied"));
    assert!(queue.is_empty());
    assert_eq!(queue.stats().sent, 1);
}

#[tokio::test]
async fn test_delivered_text_respects_length_limit() {
    let chat = Arc::new(OperatorChat::default());
    let queue = DeliveryQueue::new(
        DeliverySettings {
            max_message_length: 300,
            ..manual_settings()
        },
        chat.clone(),
        1,
    );

    queue.report(Severity::Error, "huge", Some("frame\n".repeat(2_000)), None);
    settle().await;

    let delivered = chat.delivered();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].chars().count() <= 300);
}

#[tokio::test]
async fn test_background_sweep_retries() {
    let chat = OperatorChat::unreachable();
    let queue = DeliveryQueue::new(
        DeliverySettings {
            warmup_ms: 20,
            retry_interval_ms: 20,
            max_attempts: 10,
            ..Default::default()
        },
        chat.clone(),
        1,
    );

    queue.report(Severity::Error, "transient", None, None);
    settle().await;
    chat.down.store(false, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(queue.is_empty());
    assert_eq!(chat.delivered().len(), 1);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let chat = Arc::new(OperatorChat::default());
    let queue = DeliveryQueue::new(manual_settings(), chat.clone(), 1);

    queue.start_background_processing();
    queue.start_background_processing();
    assert!(queue.is_sweep_armed());

    queue.report(Severity::Error, "once", None, None);
    settle().await;

    assert_eq!(chat.delivered().len(), 1);
}

#[tokio::test]
async fn test_shutdown_silences_queue() {
    let chat = OperatorChat::unreachable();
    let queue = DeliveryQueue::new(manual_settings(), chat.clone(), 1);

    queue.report(Severity::Error, "before shutdown", None, None);
    settle().await;
    assert_eq!(chat.attempts(), 1);

    queue.shutdown();
    queue.shutdown();
    chat.down.store(false, Ordering::SeqCst);

    queue.sweep().await;
    queue.report(Severity::Error, "after shutdown", None, None);
    settle().await;

    assert_eq!(chat.attempts(), 1);
    assert_eq!(queue.len(), 1);
    assert!(!queue.is_sweep_armed());
}
