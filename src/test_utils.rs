use std::{
    collections::HashSet,
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

use crate::{
    clock::Clock,
    models::{NotificationHandle, ReminderType, Shift},
    scheduling::{NotificationChannel, NotificationPayload},
    storage::{KeyValueStore, StoreError},
};

/// 2025-06-02 is a Monday.
pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, day)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
}

pub fn day_shift() -> Shift {
    Shift {
        id: "day".to_owned(),
        name: "Day".to_owned(),
        start_time: "08:00".to_owned(),
        end_time: "17:00".to_owned(),
        office_end_time: "17:00".to_owned(),
        departure_time: "07:30".to_owned(),
        days_applied: vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ],
        break_minutes: 60,
        remind_before_start: 15,
        remind_after_end: 10,
        is_active: true,
    }
}

pub fn night_shift() -> Shift {
    Shift {
        id: "night".to_owned(),
        name: "Night".to_owned(),
        start_time: "22:00".to_owned(),
        end_time: "06:00".to_owned(),
        office_end_time: "06:00".to_owned(),
        departure_time: "21:30".to_owned(),
        ..day_shift()
    }
}

pub struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.0.lock().unwrap() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct RecordingState {
    next_handle: u64,
    scheduled: Vec<(NaiveDateTime, NotificationPayload)>,
    live: HashSet<NotificationHandle>,
    cancelled: Vec<NotificationHandle>,
    failing_types: HashSet<ReminderType>,
    cancel_fails: bool,
}

/// Notification channel that records every call and can be told to misbehave.
#[derive(Default)]
pub struct RecordingChannel {
    state: Mutex<RecordingState>,
}

impl RecordingChannel {
    pub fn fail_scheduling(&self, reminder_type: ReminderType) {
        self.state.lock().unwrap().failing_types.insert(reminder_type);
    }

    pub fn accept_all(&self) {
        self.state.lock().unwrap().failing_types.clear();
    }

    pub fn fail_cancelling(&self) {
        self.state.lock().unwrap().cancel_fails = true;
    }

    /// Simulates the OS firing or dropping every pending notification.
    pub fn forget_all_handles(&self) {
        self.state.lock().unwrap().live.clear();
    }

    pub fn scheduled_types(&self) -> Vec<ReminderType> {
        self.state
            .lock()
            .unwrap()
            .scheduled
            .iter()
            .map(|(_, payload)| payload.reminder_type)
            .collect()
    }

    pub fn schedule_calls(&self) -> usize {
        self.state.lock().unwrap().scheduled.len()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.state.lock().unwrap().cancelled.len()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn schedule_at(
        &self,
        at: NaiveDateTime,
        payload: &NotificationPayload,
    ) -> anyhow::Result<NotificationHandle> {
        let mut state = self.state.lock().unwrap();
        if state.failing_types.contains(&payload.reminder_type) {
            anyhow::bail!("Channel refused {}", payload.reminder_type);
        }

        state.next_handle += 1;
        let handle = NotificationHandle(format!("n-{}", state.next_handle));
        state.scheduled.push((at, payload.clone()));
        state.live.insert(handle.clone());
        Ok(handle)
    }

    async fn cancel(&self, handle: &NotificationHandle) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.cancel_fails {
            anyhow::bail!("Channel unavailable");
        }

        if state.live.remove(handle) {
            state.cancelled.push(handle.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Key-value store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Backend("offline".to_owned()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), StoreError> {
        Err(StoreError::Backend("offline".to_owned()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("offline".to_owned()))
    }

    async fn remove_many(&self, _keys: &[String]) -> Result<(), StoreError> {
        Err(StoreError::Backend("offline".to_owned()))
    }

    async fn all_keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Backend("offline".to_owned()))
    }
}
