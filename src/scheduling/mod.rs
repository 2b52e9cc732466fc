mod delivery;
mod plan;
mod scheduler;

pub use delivery::{LogNotificationChannel, NotificationChannel, NotificationPayload};
pub use plan::{
    ReminderDraft, URGENT_CHECK_IN_LEAD_MINUTES, URGENT_CHECK_OUT_DELAY_MINUTES,
    plan_shift_reminders,
};
pub use scheduler::{ReminderScheduler, ScheduleOutcome, SkipReason};
