pub mod button;
pub mod reminder;
pub mod settings;
pub mod shift;

pub use button::ButtonState;
pub use reminder::{
    NoteId, NotificationHandle, Priority, Reminder, ReminderId, ReminderOwner, ReminderType,
};
pub use settings::{MinuteRange, UserSettings};
pub use shift::{Shift, ShiftId, ShiftTime};
