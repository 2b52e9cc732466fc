use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::shift::ShiftId;

pub type NoteId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Departure,
    CheckIn,
    CheckInUrgent,
    CheckOut,
    CheckOutUrgent,
    Break,
    OvertimeWarning,
    OvertimeLimit,
    WeatherPrep,
    NoteReminder,
    Test,
}

impl ReminderType {
    pub const SHIFT_TYPES: [ReminderType; 9] = [
        ReminderType::Departure,
        ReminderType::CheckIn,
        ReminderType::CheckInUrgent,
        ReminderType::CheckOut,
        ReminderType::CheckOutUrgent,
        ReminderType::Break,
        ReminderType::OvertimeWarning,
        ReminderType::OvertimeLimit,
        ReminderType::WeatherPrep,
    ];

    /// Stable key used inside reminder ids and the persisted index.
    pub fn key(&self) -> &'static str {
        match self {
            ReminderType::Departure => "departure",
            ReminderType::CheckIn => "check_in",
            ReminderType::CheckInUrgent => "check_in_urgent",
            ReminderType::CheckOut => "check_out",
            ReminderType::CheckOutUrgent => "check_out_urgent",
            ReminderType::Break => "break",
            ReminderType::OvertimeWarning => "overtime_warning",
            ReminderType::OvertimeLimit => "overtime_limit",
            ReminderType::WeatherPrep => "weather_prep",
            ReminderType::NoteReminder => "note",
            ReminderType::Test => "test",
        }
    }

    pub fn default_priority(&self) -> Priority {
        match self {
            ReminderType::Departure => Priority::Normal,
            ReminderType::CheckIn | ReminderType::CheckOut => Priority::High,
            ReminderType::CheckInUrgent | ReminderType::CheckOutUrgent => Priority::Urgent,
            ReminderType::Break | ReminderType::WeatherPrep | ReminderType::Test => Priority::Low,
            ReminderType::OvertimeWarning | ReminderType::NoteReminder => Priority::Normal,
            ReminderType::OvertimeLimit => Priority::Critical,
        }
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReminderOwner {
    Shift(ShiftId),
    Note(NoteId),
    /// Test reminders belong to nobody.
    Standalone,
}

impl ReminderOwner {
    pub fn shift_id(&self) -> Option<&str> {
        match self {
            ReminderOwner::Shift(id) => Some(id),
            _ => None,
        }
    }

    pub fn note_id(&self) -> Option<&str> {
        match self {
            ReminderOwner::Note(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for ReminderOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderOwner::Shift(id) => write!(f, "shift-{id}"),
            ReminderOwner::Note(id) => write!(f, "note-{id}"),
            ReminderOwner::Standalone => f.write_str("standalone"),
        }
    }
}

/// Identity of a reminder, derived from its type, owner and the minute it fires in.
/// Recomputing a plan for the same shift therefore yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(String);

impl ReminderId {
    pub fn derive(reminder_type: ReminderType, owner: &ReminderOwner, at: NaiveDateTime) -> Self {
        let bucket = at.and_utc().timestamp().div_euclid(60);
        Self(format!("{}:{}:{}", reminder_type.key(), owner, bucket))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token handed out by the notification channel; required to cancel delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: ReminderId,
    pub reminder_type: ReminderType,
    pub owner: ReminderOwner,
    pub scheduled_time: NaiveDateTime,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    pub notification_handle: NotificationHandle,
    pub is_active: bool,
}

impl Reminder {
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.scheduled_time < now
    }

    pub fn belongs_to_shift(&self, shift_id: &str) -> bool {
        self.owner.shift_id() == Some(shift_id)
    }
}
