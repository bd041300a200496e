//! Single-slot channel for transient user-facing messages.
//!
//! Only the most recent message is kept. Each message schedules its own
//! removal; a timer only clears the slot if its message is still the one
//! showing, so a newer message is never cut short by an older timer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use super::subject::{Subject, Subscription};

pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(3000);

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub duration_ms: u64,
    pub published_at: DateTime<Utc>,
}

/// Cloneable handle to one user's notification slot
#[derive(Clone)]
pub struct Notifier {
    slot: Subject<Option<Notification>>,
    next_id: Arc<AtomicU64>,
    default_duration: Duration,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_DURATION)
    }
}

impl Notifier {
    pub fn new(default_duration: Duration) -> Self {
        let default_duration = if default_duration.is_zero() {
            DEFAULT_NOTIFICATION_DURATION
        } else {
            default_duration
        };

        Self {
            slot: Subject::new(None),
            next_id: Arc::new(AtomicU64::new(1)),
            default_duration,
        }
    }

    /// Replaces the current message and schedules its removal
    ///
    /// `None` or a zero duration falls back to the default. Must be called
    /// from within a tokio runtime since the expiry runs as a spawned task.
    pub fn publish(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        duration: Option<Duration>,
    ) -> NotificationId {
        let duration = duration
            .filter(|d| !d.is_zero())
            .unwrap_or(self.default_duration);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let notification = Notification {
            id,
            kind,
            message: message.into(),
            duration_ms: duration.as_millis() as u64,
            published_at: Utc::now(),
        };

        match kind {
            NotificationKind::Error => {
                tracing::warn!(id, message = %notification.message, "Error notification published")
            }
            _ => {
                tracing::info!(id, kind = ?kind, message = %notification.message, "Notification published")
            }
        }

        // Deadline is fixed at publish time, not when the task first runs
        let deadline = tokio::time::Instant::now() + duration;
        self.slot.publish(Some(notification));

        let slot = self.slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let still_current = |current: &Option<Notification>| {
                current.as_ref().map(|n| n.id) == Some(id)
            };
            if slot.publish_if(still_current, None) {
                tracing::debug!(id, "Notification expired");
            }
        });

        id
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.publish(NotificationKind::Success, message, None)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.publish(NotificationKind::Error, message, None)
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.publish(NotificationKind::Info, message, None)
    }

    /// Removes the current message immediately, whatever its timer state
    pub fn clear(&self) {
        self.slot.publish(None);
    }

    pub fn current(&self) -> Option<Notification> {
        self.slot.get()
    }

    /// Observes every published message and every clearing (`None`)
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Option<Notification>) + Send + Sync + 'static,
    {
        self.slot.subscribe(observer)
    }
}
