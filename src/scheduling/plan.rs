use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::{
    models::{ReminderType, Shift, UserSettings},
    timing::ShiftTimeCalculator,
};

/// Minutes before shift start of the secondary check-in reminder.
pub const URGENT_CHECK_IN_LEAD_MINUTES: i64 = 5;
/// Minutes after the check-out reminder of its urgent follow-up.
pub const URGENT_CHECK_OUT_DELAY_MINUTES: i64 = 30;

/// One reminder the shift wants, before delivery. `at` is `None` when the
/// shift definition is too incomplete to place it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDraft {
    pub reminder_type: ReminderType,
    pub at: Option<NaiveDateTime>,
}

impl ReminderDraft {
    fn new(reminder_type: ReminderType, at: Option<NaiveDateTime>) -> Self {
        Self { reminder_type, at }
    }
}

fn shifted(at: Option<NaiveDateTime>, minutes: i64) -> Option<NaiveDateTime> {
    at?.checked_add_signed(TimeDelta::minutes(minutes))
}

/// Reminders for the occurrence of `shift` departing on `date`, for every
/// category `settings` enables.
pub fn plan_shift_reminders(
    calculator: &ShiftTimeCalculator,
    shift: &Shift,
    settings: &UserSettings,
    date: NaiveDate,
) -> Vec<ReminderDraft> {
    let mut drafts = Vec::new();
    let start = calculator.start_on(shift, date);
    let end = calculator.scheduled_end_on(shift, date);

    if settings.departure_enabled {
        drafts.push(ReminderDraft::new(
            ReminderType::Departure,
            shifted(
                calculator.departure_on(shift, date),
                -i64::from(settings.departure_minutes_before),
            ),
        ));
    }

    if settings.check_in_enabled {
        drafts.push(ReminderDraft::new(
            ReminderType::CheckIn,
            shifted(start, -i64::from(shift.remind_before_start)),
        ));
        drafts.push(ReminderDraft::new(
            ReminderType::CheckInUrgent,
            shifted(start, -URGENT_CHECK_IN_LEAD_MINUTES),
        ));
    }

    if settings.check_out_enabled {
        let check_out = shifted(end, i64::from(shift.remind_after_end));
        drafts.push(ReminderDraft::new(ReminderType::CheckOut, check_out));
        drafts.push(ReminderDraft::new(
            ReminderType::CheckOutUrgent,
            shifted(check_out, URGENT_CHECK_OUT_DELAY_MINUTES),
        ));
    }

    if settings.break_enabled && shift.break_minutes > 0 {
        drafts.push(ReminderDraft::new(
            ReminderType::Break,
            calculator.break_on(shift, date),
        ));
    }

    if settings.overtime_warning_enabled {
        drafts.push(ReminderDraft::new(
            ReminderType::OvertimeWarning,
            shifted(end, i64::from(settings.overtime_warning_minutes_after)),
        ));
    }

    if settings.overtime_limit_enabled {
        drafts.push(ReminderDraft::new(
            ReminderType::OvertimeLimit,
            shifted(end, i64::from(settings.overtime_limit_minutes_after)),
        ));
    }

    if settings.weather_prep_enabled {
        drafts.push(ReminderDraft::new(
            ReminderType::WeatherPrep,
            calculator.weather_check_on(shift, date),
        ));
    }

    drafts
}

/// Notification title and body for a shift reminder.
pub fn describe(reminder_type: ReminderType, shift: &Shift) -> (String, String) {
    let name = &shift.name;
    match reminder_type {
        ReminderType::Departure => (
            "Time to leave".to_owned(),
            format!("Head out for {name}, departure at {}.", shift.departure_time),
        ),
        ReminderType::CheckIn => (
            "Check in soon".to_owned(),
            format!("{name} starts at {}.", shift.start_time),
        ),
        ReminderType::CheckInUrgent => (
            "Check in now".to_owned(),
            format!("{name} starts in {URGENT_CHECK_IN_LEAD_MINUTES} minutes."),
        ),
        ReminderType::CheckOut => (
            "Check out".to_owned(),
            format!("{name} ended at {}.", shift.end_time),
        ),
        ReminderType::CheckOutUrgent => (
            "You have not checked out".to_owned(),
            format!("{name} ended at {}. Remember to check out.", shift.end_time),
        ),
        ReminderType::Break => (
            "Break time".to_owned(),
            format!("Take your {} minute break.", shift.break_minutes),
        ),
        ReminderType::OvertimeWarning => (
            "Overtime".to_owned(),
            format!("You are working past the end of {name}."),
        ),
        ReminderType::OvertimeLimit => (
            "Overtime limit reached".to_owned(),
            format!("You have reached the overtime limit for {name}."),
        ),
        ReminderType::WeatherPrep => (
            "Check the weather".to_owned(),
            format!("Look at the forecast before leaving for {name}."),
        ),
        ReminderType::NoteReminder | ReminderType::Test => (
            reminder_type.key().to_owned(),
            name.clone(),
        ),
    }
}
