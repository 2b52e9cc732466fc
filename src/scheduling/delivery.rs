use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::{NotificationHandle, Priority, ReminderId, ReminderType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub reminder_id: ReminderId,
    pub reminder_type: ReminderType,
    pub priority: Priority,
    pub title: String,
    pub body: String,
}

/// Device-level notification primitive. Delivery happens out of process;
/// the engine only registers and cancels.
#[async_trait]
pub trait NotificationChannel: Send + Sync + 'static {
    async fn schedule_at(
        &self,
        at: NaiveDateTime,
        payload: &NotificationPayload,
    ) -> anyhow::Result<NotificationHandle>;

    /// Returns `false` when the handle is no longer known to the channel.
    async fn cancel(&self, handle: &NotificationHandle) -> anyhow::Result<bool>;
}

/// Channel that only writes to the log. Used when no device channel is wired.
#[derive(Default)]
pub struct LogNotificationChannel {
    next_handle: AtomicU64,
}

#[async_trait]
impl NotificationChannel for LogNotificationChannel {
    async fn schedule_at(
        &self,
        at: NaiveDateTime,
        payload: &NotificationPayload,
    ) -> anyhow::Result<NotificationHandle> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "[NOTIFY] {} at {} ({:?}): {}. ReminderId {}",
            payload.reminder_type,
            at,
            payload.priority,
            payload.title,
            payload.reminder_id
        );
        Ok(NotificationHandle(format!("log-{handle}")))
    }

    async fn cancel(&self, handle: &NotificationHandle) -> anyhow::Result<bool> {
        log::info!("[NOTIFY] Cancelled {}", handle.0);
        Ok(true)
    }
}
