use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use thiserror::Error;

use crate::{
    clock::Clock,
    models::{
        NoteId, Reminder, ReminderId, ReminderOwner, ReminderType, Shift, UserSettings,
    },
    storage::{ReminderStats, ReminderStore, StoreError},
    timing::ShiftTimeCalculator,
};

use super::{
    delivery::{NotificationChannel, NotificationPayload},
    plan::{describe, plan_shift_reminders},
};

/// Why a reminder was not scheduled. None of these are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("{reminder_type} at {at} is not in the future")]
    NotInFuture {
        reminder_type: ReminderType,
        at: NaiveDateTime,
    },
    #[error("{reminder_type} cannot be placed from the shift definition")]
    Unresolvable { reminder_type: ReminderType },
    #[error("{reminder_type} is already scheduled as {id}")]
    AlreadyScheduled {
        reminder_type: ReminderType,
        id: ReminderId,
    },
    #[error("delivery of {reminder_type} failed: {message}")]
    DeliveryFailed {
        reminder_type: ReminderType,
        message: String,
    },
    #[error("shift has no upcoming work day")]
    NoUpcomingWorkDay,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub scheduled: Vec<ReminderId>,
    pub skipped: Vec<SkipReason>,
}

struct ReminderRequest {
    reminder_type: ReminderType,
    owner: ReminderOwner,
    at: NaiveDateTime,
    title: String,
    body: String,
}

/// Turns shifts and notes into registered notifications and keeps the
/// [`ReminderStore`] in step with what the notification channel holds.
pub struct ReminderScheduler {
    store: ReminderStore,
    channel: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    calculator: ShiftTimeCalculator,
}

impl ReminderScheduler {
    pub fn new(
        store: ReminderStore,
        channel: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        calculator: ShiftTimeCalculator,
    ) -> Self {
        Self {
            store,
            channel,
            clock,
            calculator,
        }
    }

    pub fn calculator(&self) -> &ShiftTimeCalculator {
        &self.calculator
    }

    /// Reloads the persisted index after a restart.
    pub async fn restore(&mut self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        self.store.restore(now).await
    }

    /// Schedules every enabled category for the shift's upcoming occurrence.
    /// Categories that are past, unplaceable, already scheduled or refused by
    /// the channel are reported in `skipped`; the rest still go through.
    pub async fn schedule_all_for_shift(
        &mut self,
        shift: &Shift,
        settings: &UserSettings,
    ) -> ScheduleOutcome {
        let now = self.clock.now();
        match self.calculator.upcoming_cycle_date(shift, now) {
            Some(date) => self.schedule_cycle(shift, settings, date).await,
            None => {
                log::debug!("Shift {} has no upcoming work day", shift.id);
                ScheduleOutcome {
                    scheduled: Vec::new(),
                    skipped: vec![SkipReason::NoUpcomingWorkDay],
                }
            }
        }
    }

    /// Schedules every enabled category for the occurrence departing on `date`.
    /// Safe to repeat: reminders already in the index are skipped.
    pub async fn schedule_cycle(
        &mut self,
        shift: &Shift,
        settings: &UserSettings,
        date: NaiveDate,
    ) -> ScheduleOutcome {
        let now = self.clock.now();
        let mut outcome = ScheduleOutcome::default();
        let settings = settings.clamped();
        let owner = ReminderOwner::Shift(shift.id.clone());
        let mut created = Vec::new();

        for draft in plan_shift_reminders(&self.calculator, shift, &settings, date) {
            let Some(at) = draft.at else {
                outcome.skipped.push(SkipReason::Unresolvable {
                    reminder_type: draft.reminder_type,
                });
                continue;
            };

            let (title, body) = describe(draft.reminder_type, shift);
            let request = ReminderRequest {
                reminder_type: draft.reminder_type,
                owner: owner.clone(),
                at,
                title,
                body,
            };

            match self.register(request, now).await {
                Ok(reminder) => {
                    outcome.scheduled.push(reminder.id.clone());
                    created.push(reminder);
                }
                Err(reason) => {
                    log::debug!("Skipped reminder for shift {}: {}", shift.id, reason);
                    outcome.skipped.push(reason);
                }
            }
        }

        if created.is_empty() {
            log::debug!("Nothing new to schedule for shift {} on {}", shift.id, date);
            return outcome;
        }

        self.store.insert_all(created).await;
        log::info!(
            "Scheduled {} reminders for shift {} on {} ({} skipped)",
            outcome.scheduled.len(),
            shift.id,
            date,
            outcome.skipped.len()
        );

        outcome
    }

    pub async fn schedule_note_reminder(
        &mut self,
        note_id: &NoteId,
        title: &str,
        at: NaiveDateTime,
    ) -> Result<ReminderId, SkipReason> {
        let request = ReminderRequest {
            reminder_type: ReminderType::NoteReminder,
            owner: ReminderOwner::Note(note_id.clone()),
            at,
            title: title.to_owned(),
            body: "Note reminder".to_owned(),
        };
        self.register_and_store(request).await
    }

    /// Schedules a standalone notification `delay` from now to check delivery works.
    pub async fn schedule_test_reminder(&mut self, delay: TimeDelta) -> Result<ReminderId, SkipReason> {
        let request = ReminderRequest {
            reminder_type: ReminderType::Test,
            owner: ReminderOwner::Standalone,
            at: self.clock.now() + delay,
            title: "Test reminder".to_owned(),
            body: "Notifications are working.".to_owned(),
        };
        self.register_and_store(request).await
    }

    /// Returns `false` when the reminder is unknown or was already cancelled.
    pub async fn cancel(&mut self, id: &ReminderId) -> bool {
        match self.store.remove(id).await {
            Some(reminder) => {
                self.release(std::slice::from_ref(&reminder)).await;
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all_for_shift(&mut self, shift_id: &str) -> usize {
        let removed = self
            .store
            .remove_where(|reminder| reminder.belongs_to_shift(shift_id))
            .await;
        self.release(&removed).await;
        removed.len()
    }

    pub async fn cancel_types_for_shift(
        &mut self,
        shift_id: &str,
        types: &[ReminderType],
    ) -> usize {
        let removed = self
            .store
            .remove_where(|reminder| {
                reminder.belongs_to_shift(shift_id) && types.contains(&reminder.reminder_type)
            })
            .await;
        self.release(&removed).await;
        removed.len()
    }

    pub async fn cancel_all_for_note(&mut self, note_id: &str) -> usize {
        let removed = self
            .store
            .remove_where(|reminder| reminder.owner.note_id() == Some(note_id))
            .await;
        self.release(&removed).await;
        removed.len()
    }

    /// Cancels everything. Returns whether the emptied index was persisted.
    pub async fn cancel_all(&mut self) -> bool {
        let (removed, persisted) = self.store.clear().await;
        self.release(&removed).await;
        persisted
    }

    /// Forgets reminders whose time has passed. Their notifications have fired.
    pub async fn cleanup_expired(&mut self, now: NaiveDateTime) -> usize {
        let removed = self.store.remove_expired(now).await;
        if !removed.is_empty() {
            log::info!("Cleaned up {} expired reminders", removed.len());
        }
        removed.len()
    }

    pub fn stats(&self, now: NaiveDateTime) -> ReminderStats {
        self.store.stats(now)
    }

    pub fn stats_for_shift(&self, shift_id: &str, now: NaiveDateTime) -> ReminderStats {
        self.store
            .stats_where(now, |reminder| reminder.belongs_to_shift(shift_id))
    }

    pub fn reminders_for_shift(&self, shift_id: &str) -> Vec<Reminder> {
        self.store
            .filtered(|reminder| reminder.belongs_to_shift(shift_id))
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn next_reminder(&self, now: NaiveDateTime) -> Option<Reminder> {
        self.store.next_after(now).cloned()
    }

    async fn register_and_store(&mut self, request: ReminderRequest) -> Result<ReminderId, SkipReason> {
        let now = self.clock.now();
        let reminder = self.register(request, now).await?;
        let id = reminder.id.clone();
        self.store.insert_all(vec![reminder]).await;
        Ok(id)
    }

    async fn register(
        &self,
        request: ReminderRequest,
        now: NaiveDateTime,
    ) -> Result<Reminder, SkipReason> {
        let ReminderRequest {
            reminder_type,
            owner,
            at,
            title,
            body,
        } = request;

        if at <= now {
            return Err(SkipReason::NotInFuture { reminder_type, at });
        }

        let id = ReminderId::derive(reminder_type, &owner, at);
        if self.store.contains(&id) {
            return Err(SkipReason::AlreadyScheduled { reminder_type, id });
        }

        let payload = NotificationPayload {
            reminder_id: id.clone(),
            reminder_type,
            priority: reminder_type.default_priority(),
            title,
            body,
        };

        let handle = self.channel.schedule_at(at, &payload).await.map_err(|error| {
            log::warn!(
                "Notification channel refused reminder. [reminder_id = {}, error = {}]",
                id,
                error
            );
            SkipReason::DeliveryFailed {
                reminder_type,
                message: error.to_string(),
            }
        })?;

        log::info!("[SCHEDULE] {} at {}. ReminderId {}", reminder_type, at, id);

        Ok(Reminder {
            id,
            reminder_type,
            owner,
            scheduled_time: at,
            priority: payload.priority,
            title: payload.title,
            body: payload.body,
            notification_handle: handle,
            is_active: true,
        })
    }

    /// Cancels delivery of already-removed reminders. Stale handles are expected
    /// (the notification may have fired) and are not errors.
    async fn release(&self, reminders: &[Reminder]) {
        for reminder in reminders {
            match self.channel.cancel(&reminder.notification_handle).await {
                Ok(true) => log::debug!("[CANCEL] ReminderId {}", reminder.id),
                Ok(false) => log::debug!(
                    "Notification for reminder {} was already gone",
                    reminder.id
                ),
                Err(error) => log::debug!(
                    "Ignoring failure to cancel notification. [reminder_id = {}, error = {}]",
                    reminder.id,
                    error
                ),
            }
        }
    }
}
