use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::NaiveDateTime;

use crate::models::{Reminder, ReminderId, ReminderType};

use super::key_value::{KeyValueStore, StoreError, load_json, save_json};

pub const REMINDER_INDEX_KEY: &str = "shiftbell.reminders";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderStats {
    pub total: usize,
    pub upcoming: usize,
    pub expired: usize,
    pub by_type: BTreeMap<ReminderType, usize>,
}

/// In-memory index of scheduled reminders, mirrored to a single key-value entry
/// so it can be recovered after a restart.
///
/// The in-memory index is authoritative. A failed write is logged and the next
/// mutation rewrites the whole entry.
pub struct ReminderStore {
    reminders: HashMap<ReminderId, Reminder>,
    kv: Arc<dyn KeyValueStore>,
}

impl ReminderStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            reminders: HashMap::new(),
            kv,
        }
    }

    /// Replaces the index with the persisted one, dropping reminders already in the past.
    pub async fn restore(&mut self, now: NaiveDateTime) -> Result<usize, StoreError> {
        let persisted: Vec<Reminder> = load_json(self.kv.as_ref(), REMINDER_INDEX_KEY)
            .await?
            .unwrap_or_default();
        let before = persisted.len();

        self.reminders = persisted
            .into_iter()
            .filter(|reminder| !reminder.is_expired(now))
            .map(|reminder| (reminder.id.clone(), reminder))
            .collect();

        if self.reminders.len() != before {
            log::info!(
                "Dropped {} expired reminders while restoring",
                before - self.reminders.len()
            );
            self.persist().await;
        }

        Ok(self.reminders.len())
    }

    pub fn contains(&self, id: &ReminderId) -> bool {
        self.reminders.contains_key(id)
    }

    pub fn get(&self, id: &ReminderId) -> Option<&Reminder> {
        self.reminders.get(id)
    }

    pub fn len(&self) -> usize {
        self.reminders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }

    pub async fn insert_all(&mut self, reminders: Vec<Reminder>) {
        if reminders.is_empty() {
            return;
        }

        for reminder in reminders {
            self.reminders.insert(reminder.id.clone(), reminder);
        }
        self.persist().await;
    }

    pub async fn remove(&mut self, id: &ReminderId) -> Option<Reminder> {
        let mut removed = self.reminders.remove(id)?;
        removed.is_active = false;
        self.persist().await;
        Some(removed)
    }

    pub async fn remove_where(&mut self, predicate: impl Fn(&Reminder) -> bool) -> Vec<Reminder> {
        let ids: Vec<ReminderId> = self
            .reminders
            .values()
            .filter(|reminder| predicate(reminder))
            .map(|reminder| reminder.id.clone())
            .collect();

        if ids.is_empty() {
            return Vec::new();
        }

        let removed = ids
            .iter()
            .filter_map(|id| self.reminders.remove(id))
            .map(|mut reminder| {
                reminder.is_active = false;
                reminder
            })
            .collect();
        self.persist().await;
        removed
    }

    pub async fn remove_expired(&mut self, now: NaiveDateTime) -> Vec<Reminder> {
        self.remove_where(|reminder| reminder.is_expired(now)).await
    }

    /// Empties the index. Returns the removed reminders and whether the empty
    /// index reached the key-value store.
    pub async fn clear(&mut self) -> (Vec<Reminder>, bool) {
        let removed = self
            .reminders
            .drain()
            .map(|(_, mut reminder)| {
                reminder.is_active = false;
                reminder
            })
            .collect();
        let persisted = self.persist().await;
        (removed, persisted)
    }

    /// Reminders matching `predicate`, earliest first.
    pub fn filtered(&self, predicate: impl Fn(&Reminder) -> bool) -> Vec<&Reminder> {
        let mut reminders: Vec<&Reminder> = self
            .reminders
            .values()
            .filter(|reminder| predicate(reminder))
            .collect();
        reminders.sort_by(|a, b| {
            a.scheduled_time
                .cmp(&b.scheduled_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        reminders
    }

    pub fn next_after(&self, now: NaiveDateTime) -> Option<&Reminder> {
        self.filtered(|reminder| !reminder.is_expired(now))
            .into_iter()
            .next()
    }

    pub fn stats(&self, now: NaiveDateTime) -> ReminderStats {
        self.stats_where(now, |_| true)
    }

    pub fn stats_where(
        &self,
        now: NaiveDateTime,
        predicate: impl Fn(&Reminder) -> bool,
    ) -> ReminderStats {
        let mut stats = ReminderStats::default();
        for reminder in self.reminders.values().filter(|r| predicate(r)) {
            stats.total += 1;
            if reminder.is_expired(now) {
                stats.expired += 1;
            } else {
                stats.upcoming += 1;
            }
            *stats.by_type.entry(reminder.reminder_type).or_default() += 1;
        }
        stats
    }

    async fn persist(&self) -> bool {
        let snapshot = self.filtered(|_| true);
        match save_json(self.kv.as_ref(), REMINDER_INDEX_KEY, &snapshot).await {
            Ok(()) => true,
            Err(error) => {
                log::warn!(
                    "Could not persist reminder index, keeping it in memory. error = {}",
                    error
                );
                false
            }
        }
    }
}
