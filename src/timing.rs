use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use serde::Deserialize;

use crate::models::Shift;

/// How far ahead `next_applicable_work_day` looks before giving up.
const WORK_DAY_SCAN_DAYS: u64 = 7;

/// Relation between a shift's start and end on the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftSpan {
    SameDay,
    Overnight,
    Invalid,
}

/// Offsets around a shift that drive the attendance button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingRules {
    pub reset_lead_minutes: i64,
    pub hide_delay_minutes: i64,
    pub weather_lead_minutes: i64,
}

impl TimingRules {
    fn reset_lead(&self) -> TimeDelta {
        TimeDelta::minutes(self.reset_lead_minutes)
    }

    fn hide_delay(&self) -> TimeDelta {
        TimeDelta::minutes(self.hide_delay_minutes)
    }

    fn weather_lead(&self) -> TimeDelta {
        TimeDelta::minutes(self.weather_lead_minutes)
    }
}

impl Default for TimingRules {
    fn default() -> Self {
        Self {
            reset_lead_minutes: 60,
            hide_delay_minutes: 120,
            weather_lead_minutes: 60,
        }
    }
}

/// Every instant derived for one shift at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftTimings {
    pub span: ShiftSpan,
    pub departure: Option<NaiveDateTime>,
    pub start: Option<NaiveDateTime>,
    pub scheduled_end: Option<NaiveDateTime>,
    pub reset: Option<NaiveDateTime>,
    pub hide: Option<NaiveDateTime>,
    pub weather_check: Option<NaiveDateTime>,
    pub next_work_day: Option<NaiveDate>,
    pub office_work_minutes: Option<i64>,
}

impl ShiftTimings {
    pub fn is_complete(&self) -> bool {
        self.span != ShiftSpan::Invalid && self.departure.is_some() && self.scheduled_end.is_some()
    }
}

/// Pure time arithmetic over a [`Shift`].
///
/// Functions taking a date compute the occurrence departing on that date.
/// Functions taking `now` first resolve which occurrence is current: an
/// overnight shift still inside yesterday's window belongs to yesterday,
/// anything else to today. No function panics or loops on bad input; they
/// return `None` instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShiftTimeCalculator {
    rules: TimingRules,
}

impl ShiftTimeCalculator {
    pub fn new(rules: TimingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &TimingRules {
        &self.rules
    }

    pub fn span(&self, shift: &Shift) -> ShiftSpan {
        match (shift.start(), shift.end()) {
            (Some(start), Some(end)) if end < start => ShiftSpan::Overnight,
            (Some(_), Some(_)) => ShiftSpan::SameDay,
            _ => ShiftSpan::Invalid,
        }
    }

    pub fn is_overnight(&self, shift: &Shift) -> bool {
        self.span(shift) == ShiftSpan::Overnight
    }

    pub fn departure_on(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDateTime> {
        Some(date.and_time(shift.departure()?.time()))
    }

    pub fn start_on(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDateTime> {
        Some(date.and_time(shift.start()?.time()))
    }

    pub fn scheduled_end_on(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDateTime> {
        let end = date.and_time(shift.end()?.time());
        match self.span(shift) {
            ShiftSpan::Overnight => end.checked_add_signed(TimeDelta::days(1)),
            ShiftSpan::SameDay | ShiftSpan::Invalid => Some(end),
        }
    }

    pub fn hide_on(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDateTime> {
        self.scheduled_end_on(shift, date)?
            .checked_add_signed(self.rules.hide_delay())
    }

    pub fn reset_on(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDateTime> {
        self.departure_on(shift, date)?
            .checked_sub_signed(self.rules.reset_lead())
    }

    pub fn weather_check_on(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDateTime> {
        self.departure_on(shift, date)?
            .checked_sub_signed(self.rules.weather_lead())
    }

    /// Temporal midpoint between start and scheduled end.
    pub fn break_on(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDateTime> {
        let start = self.start_on(shift, date)?;
        let end = self.scheduled_end_on(shift, date)?;
        if end <= start {
            return None;
        }

        start.checked_add_signed((end - start) / 2)
    }

    /// Date the current occurrence of the shift departed on.
    pub fn anchor_date(&self, shift: &Shift, now: NaiveDateTime) -> NaiveDate {
        let today = now.date();
        if self.span(shift) != ShiftSpan::Overnight {
            return today;
        }

        let previous_still_open = today.pred_opt().filter(|yesterday| {
            shift.applies_on(yesterday.weekday())
                && self
                    .hide_on(shift, *yesterday)
                    .is_some_and(|hide| now <= hide)
        });

        previous_still_open.unwrap_or(today)
    }

    pub fn departure_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.departure_on(shift, self.anchor_date(shift, now))
    }

    pub fn start_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.start_on(shift, self.anchor_date(shift, now))
    }

    pub fn scheduled_end_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.scheduled_end_on(shift, self.anchor_date(shift, now))
    }

    /// Reset instant of the current occurrence, without moving to the next work day.
    pub fn current_reset_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.reset_on(shift, self.anchor_date(shift, now))
    }

    /// Next instant at which the button starts a new day. Once today's reset
    /// has passed this moves to the next applicable work day.
    pub fn button_reset_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if shift.days_applied.is_empty() {
            return None;
        }

        let reset = self.current_reset_time(shift, now)?;
        if reset > now {
            return Some(reset);
        }

        let next_day = self.next_applicable_work_day(shift, now)?;
        self.reset_on(shift, next_day)
    }

    pub fn button_hide_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.hide_on(shift, self.anchor_date(shift, now))
    }

    pub fn weather_check_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.weather_check_on(shift, self.anchor_date(shift, now))
    }

    pub fn break_time(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.break_on(shift, self.anchor_date(shift, now))
    }

    /// First date after `now`'s date, at most a week ahead, on which the shift applies.
    pub fn next_applicable_work_day(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDate> {
        self.work_day_after(shift, now.date())
    }

    pub fn work_day_after(&self, shift: &Shift, date: NaiveDate) -> Option<NaiveDate> {
        if shift.days_applied.is_empty() {
            return None;
        }

        (1..=WORK_DAY_SCAN_DAYS)
            .filter_map(|offset| date.checked_add_days(chrono::Days::new(offset)))
            .find(|date| shift.applies_on(date.weekday()))
    }

    /// Date whose occurrence reminders should be planned for: the current
    /// occurrence while its window is open on a work day, else the next work day.
    pub fn upcoming_cycle_date(&self, shift: &Shift, now: NaiveDateTime) -> Option<NaiveDate> {
        let anchor = self.anchor_date(shift, now);
        let anchor_open = shift.applies_on(anchor.weekday())
            && self.hide_on(shift, anchor).is_some_and(|hide| now <= hide);

        if anchor_open {
            Some(anchor)
        } else {
            self.next_applicable_work_day(shift, now)
        }
    }

    /// Fails open: a shift whose window cannot be computed keeps the button visible.
    pub fn should_show_button(&self, shift: &Shift, now: NaiveDateTime) -> bool {
        match (
            self.current_reset_time(shift, now),
            self.button_hide_time(shift, now),
        ) {
            (Some(reset), Some(hide)) => reset <= now && now <= hide,
            _ => true,
        }
    }

    pub fn should_reset_button_state(&self, shift: &Shift, now: NaiveDateTime) -> bool {
        self.current_reset_time(shift, now)
            .is_some_and(|reset| now >= reset)
    }

    pub fn timings(&self, shift: &Shift, now: NaiveDateTime) -> ShiftTimings {
        ShiftTimings {
            span: self.span(shift),
            departure: self.departure_time(shift, now),
            start: self.start_time(shift, now),
            scheduled_end: self.scheduled_end_time(shift, now),
            reset: self.button_reset_time(shift, now),
            hide: self.button_hide_time(shift, now),
            weather_check: self.weather_check_time(shift, now),
            next_work_day: self.next_applicable_work_day(shift, now),
            office_work_minutes: shift.office_work_minutes(),
        }
    }
}
