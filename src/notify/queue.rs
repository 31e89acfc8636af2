//! Bounded, retrying delivery of operator notifications.
//!
//! Failure sites call [`DeliveryQueue::report`] synchronously. The report is
//! logged locally, queued (or dropped if the queue is full), and an immediate
//! send is attempted on a spawned task. A periodic sweep retries whatever is
//! still queued until it is delivered or its attempts are exhausted.
//!
//! At most one send is in flight at any time: the opportunistic path and the
//! sweep share a single-permit semaphore.
//!
//! Records taken out by a running sweep still count against
//! `max_queue_size`, so the queue never holds more than that many.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::format::format_notification;
use crate::adapters::MessageSource;
use crate::domain::{PendingNotification, Severity};

/// Delivery queue tuning (`error_logging` section of the config file)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Send notifications to the operator chat at all
    pub enabled: bool,
    /// Upper bound on the formatted message, in characters
    pub max_message_length: usize,
    /// Send attempts before a notification is dropped
    pub max_attempts: u32,
    /// Period of the retry sweep
    pub retry_interval_ms: u64,
    /// Queued notifications beyond this are dropped
    pub max_queue_size: usize,
    /// Delay before the first sweep
    pub warmup_ms: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_message_length: 4000,
            max_attempts: 3,
            retry_interval_ms: 5000,
            max_queue_size: 100,
            warmup_ms: 10_000,
        }
    }
}

/// Counters for terminal dispositions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: u64,
    pub overflowed: u64,
    pub exhausted: u64,
}

/// Queued records plus those a sweep has taken out but not yet resolved
#[derive(Default)]
struct Backlog {
    items: VecDeque<PendingNotification>,
    draining: usize,
}

impl Backlog {
    fn occupied(&self) -> usize {
        self.items.len() + self.draining
    }
}

/// Shared state used by callers, spawned sends and the sweep task
struct Inner {
    settings: DeliverySettings,
    sender: Arc<dyn MessageSource>,
    /// Operator chat
    destination: i64,
    backlog: Mutex<Backlog>,
    send_permit: Semaphore,
    disposed: AtomicBool,
    sent: AtomicU64,
    overflowed: AtomicU64,
    exhausted: AtomicU64,
}

impl Inner {
    fn max_attempts(&self) -> u32 {
        self.settings.max_attempts.max(1)
    }

    /// Format and send one notification. The caller holds the send permit.
    async fn deliver(&self, pending: &PendingNotification) -> bool {
        let text = format_notification(pending, self.settings.max_message_length);

        match self.sender.send_text(self.destination, &text).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(id = %pending.id, "Notification delivered");
                true
            }
            Err(e) => {
                tracing::debug!(
                    id = %pending.id,
                    attempts = pending.attempts + 1,
                    error = %e,
                    "Notification delivery failed, keeping it for retry"
                );
                false
            }
        }
    }

    /// Immediate send of a freshly queued notification
    async fn send_queued(&self, id: Uuid) {
        let Ok(_permit) = self.send_permit.acquire().await else {
            return;
        };

        // The sweep may have taken it while we waited for the permit
        let pending = self.backlog.lock().items.iter().find(|n| n.id == id).cloned();
        let Some(pending) = pending else {
            return;
        };

        if self.deliver(&pending).await {
            self.backlog.lock().items.retain(|n| n.id != id);
        } else {
            self.record_failure(id);
        }
    }

    /// Replace a queued record with its next-attempt copy, dropping it at the cap
    fn record_failure(&self, id: Uuid) {
        let mut backlog = self.backlog.lock();
        let Some(position) = backlog.items.iter().position(|n| n.id == id) else {
            return;
        };

        let updated = backlog.items[position].with_attempt();
        if updated.attempts >= self.max_attempts() {
            backlog.items.remove(position);
            drop(backlog);
            self.mark_exhausted(&updated);
        } else {
            backlog.items[position] = updated;
        }
    }

    /// Put a drained record back after a failed send
    fn requeue(&self, pending: PendingNotification) {
        let mut backlog = self.backlog.lock();
        backlog.draining = backlog.draining.saturating_sub(1);

        if pending.attempts >= self.max_attempts() {
            drop(backlog);
            self.mark_exhausted(&pending);
            return;
        }

        if backlog.occupied() >= self.settings.max_queue_size {
            drop(backlog);
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(id = %pending.id, "Delivery queue full, dropping notification retry");
            return;
        }
        backlog.items.push_back(pending);
    }

    /// Release capacity held by `count` drained records
    fn release_drained(&self, count: usize) {
        let mut backlog = self.backlog.lock();
        backlog.draining = backlog.draining.saturating_sub(count);
    }

    fn mark_exhausted(&self, pending: &PendingNotification) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            id = %pending.id,
            attempts = pending.attempts,
            "Notification exceeded max delivery attempts, dropping it"
        );
    }

    /// Drain the queue once, retrying every record
    async fn sweep(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let drained: Vec<PendingNotification> = {
            let mut backlog = self.backlog.lock();
            let drained: Vec<_> = backlog.items.drain(..).collect();
            backlog.draining += drained.len();
            drained
        };
        if drained.is_empty() {
            return;
        }
        tracing::debug!(count = drained.len(), "Retrying queued notifications");

        let total = drained.len();
        for (index, pending) in drained.into_iter().enumerate() {
            if pending.attempts >= self.max_attempts() {
                self.release_drained(1);
                self.mark_exhausted(&pending);
                continue;
            }

            let Ok(permit) = self.send_permit.acquire().await else {
                // Shut down mid-sweep
                self.release_drained(total - index);
                return;
            };
            let delivered = self.deliver(&pending).await;
            drop(permit);

            if delivered {
                self.release_drained(1);
            } else {
                self.requeue(pending.with_attempt());
            }
        }
    }
}

/// Bounded notification queue with background retry
pub struct DeliveryQueue {
    inner: Arc<Inner>,
    sweep: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl DeliveryQueue {
    /// Create a queue delivering to `destination` through `sender`.
    ///
    /// The retry sweep is armed immediately when called inside a tokio runtime.
    pub fn new(settings: DeliverySettings, sender: Arc<dyn MessageSource>, destination: i64) -> Self {
        let queue = Self {
            inner: Arc::new(Inner {
                settings,
                sender,
                destination,
                backlog: Mutex::new(Backlog::default()),
                send_permit: Semaphore::new(1),
                disposed: AtomicBool::new(false),
                sent: AtomicU64::new(0),
                overflowed: AtomicU64::new(0),
                exhausted: AtomicU64::new(0),
            }),
            sweep: Mutex::new(None),
            shutdown: CancellationToken::new(),
        };
        queue.arm_sweep();
        queue
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.inner.settings
    }

    /// Arm the retry sweep if it is not running yet.
    ///
    /// Idempotent: the sweep is normally armed at construction, so this only
    /// does something for queues built outside a runtime.
    pub fn start_background_processing(&self) {
        if self.arm_sweep() {
            tracing::info!("Notification retry sweep started");
        } else {
            tracing::info!("Notification retry sweep already running");
        }
    }

    /// Whether the periodic sweep task exists
    pub fn is_sweep_armed(&self) -> bool {
        self.sweep.lock().is_some()
    }

    fn arm_sweep(&self) -> bool {
        if self.inner.disposed.load(Ordering::Acquire) || !self.inner.settings.enabled {
            return false;
        }

        let mut slot = self.sweep.lock();
        if slot.is_some() {
            return false;
        }
        let Ok(handle) = Handle::try_current() else {
            return false;
        };

        let inner = Arc::clone(&self.inner);
        let shutdown = self.shutdown.clone();
        *slot = Some(handle.spawn(run_sweep(inner, shutdown)));
        true
    }

    /// Log a failure locally and queue it for the operator chat
    pub fn report(
        &self,
        severity: Severity,
        summary: impl Into<String>,
        detail: Option<String>,
        context: Option<&str>,
    ) {
        let summary = summary.into();
        let context_label = context.unwrap_or("unknown");

        match severity {
            Severity::Critical => tracing::error!(
                severity = "critical",
                context = context_label,
                detail = detail.as_deref().unwrap_or_default(),
                "{}",
                summary
            ),
            Severity::Error => tracing::error!(
                context = context_label,
                detail = detail.as_deref().unwrap_or_default(),
                "{}",
                summary
            ),
        }

        if !self.inner.settings.enabled || self.inner.disposed.load(Ordering::Acquire) {
            return;
        }

        let mut pending = PendingNotification::new(severity, summary);
        if let Some(detail) = detail {
            pending = pending.with_detail(detail);
        }
        if let Some(context) = context {
            pending = pending.with_context(context);
        }
        let id = pending.id;

        {
            let mut backlog = self.inner.backlog.lock();
            if backlog.occupied() >= self.inner.settings.max_queue_size {
                drop(backlog);
                self.inner.overflowed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Delivery queue full, notification will not be sent");
                return;
            }
            backlog.items.push_back(pending);
        }
        tracing::debug!(%id, "Notification queued");

        if let Ok(handle) = Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move { inner.send_queued(id).await });
        }
    }

    /// Report an error with its full cause chain
    pub fn error(&self, error: &anyhow::Error, context: Option<&str>) {
        self.report(
            Severity::Error,
            error.to_string(),
            Some(format!("{:?}", error)),
            context,
        );
    }

    /// Report a failure the process cannot recover from
    pub fn critical(&self, error: &anyhow::Error, context: Option<&str>) {
        self.report(
            Severity::Critical,
            error.to_string(),
            Some(format!("{:?}", error)),
            context,
        );
    }

    /// Run one retry pass now
    pub async fn sweep(&self) {
        self.inner.sweep().await;
    }

    /// Notifications held, including any a running sweep is retrying
    pub fn len(&self) -> usize {
        self.inner.backlog.lock().occupied()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of queued notifications, oldest first
    pub fn pending(&self) -> Vec<PendingNotification> {
        self.inner.backlog.lock().items.iter().cloned().collect()
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            sent: self.inner.sent.load(Ordering::Relaxed),
            overflowed: self.inner.overflowed.load(Ordering::Relaxed),
            exhausted: self.inner.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Stop the sweep and refuse further sends. Safe to call repeatedly.
    ///
    /// A send already in flight is left to finish on its own.
    pub fn shutdown(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.cancel();
        self.inner.send_permit.close();
        self.sweep.lock().take();

        let remaining = self.len();
        if remaining > 0 {
            tracing::warn!(remaining, "Delivery queue shut down with undelivered notifications");
        } else {
            tracing::debug!("Delivery queue shut down");
        }
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodic retry loop; cancellation is only observed between sweeps
async fn run_sweep(inner: Arc<Inner>, shutdown: CancellationToken) {
    let warmup = Duration::from_millis(inner.settings.warmup_ms);
    let period = Duration::from_millis(inner.settings.retry_interval_ms.max(1));

    let mut ticker = tokio::time::interval_at(Instant::now() + warmup, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => inner.sweep().await,
        }
    }
}
