use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    button::{
        ButtonCommand, ButtonContext, ButtonError, ButtonMode, ButtonSnapshot, ButtonStateMachine,
        ButtonView, Transition,
    },
    clock::Clock,
    events::{EngineEvent, EventBus, Subscription},
    models::{ButtonState, NoteId, Reminder, ReminderId, Shift, ShiftId, UserSettings},
    scheduling::{NotificationChannel, ReminderScheduler, ScheduleOutcome, SkipReason},
    storage::{KeyValueStore, ReminderStats, ReminderStore, StoreError, load_json, save_json},
    timing::{ShiftTimeCalculator, ShiftTimings, TimingRules},
};

pub const KEY_PREFIX: &str = "shiftbell.";
pub const ACTIVE_SHIFT_KEY: &str = "shiftbell.active_shift";
pub const USER_SETTINGS_KEY: &str = "shiftbell.user_settings";
pub const BUTTON_STATE_KEY: &str = "shiftbell.button_state";

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    pub timing_rules: TimingRules,
    pub button_mode: ButtonMode,
    /// Used until settings have been replaced and persisted once.
    pub default_settings: UserSettings,
}

struct EngineState {
    active_shift: Option<Shift>,
    settings: UserSettings,
    timings: Option<ShiftTimings>,
    scheduler: ReminderScheduler,
    button: ButtonStateMachine,
}

impl EngineState {
    fn button_parts(&mut self, now: NaiveDateTime) -> (&mut ButtonStateMachine, ButtonContext<'_>) {
        let ctx = ButtonContext {
            scheduler: &mut self.scheduler,
            shift: self.active_shift.as_ref(),
            settings: &self.settings,
            now,
        };
        (&mut self.button, ctx)
    }
}

/// Picks the governing shift from a list that should hold at most one active
/// entry. With several, the last one (the most recently set) wins.
pub fn select_active_shift(shifts: &[Shift]) -> Option<&Shift> {
    let active_count = shifts.iter().filter(|shift| shift.is_active).count();
    debug_assert!(active_count <= 1, "{active_count} shifts are marked active");
    if active_count > 1 {
        log::warn!("{} shifts are marked active, using the last one", active_count);
    }

    shifts.iter().rev().find(|shift| shift.is_active)
}

/// Owns the active shift and everything derived from it.
///
/// All engine state sits behind one mutex, so user commands and the polling
/// worker never interleave. Setting the active shift returns only after old
/// reminders are cancelled, new ones scheduled and subscribers notified.
pub struct ActiveShiftController {
    state: Mutex<EngineState>,
    events: EventBus,
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl ActiveShiftController {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        channel: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        options: ControllerOptions,
    ) -> Self {
        let scheduler = ReminderScheduler::new(
            ReminderStore::new(kv.clone()),
            channel,
            clock.clone(),
            ShiftTimeCalculator::new(options.timing_rules),
        );

        let state = EngineState {
            active_shift: None,
            settings: options.default_settings.clamped(),
            timings: None,
            scheduler,
            button: ButtonStateMachine::new(options.button_mode),
        };

        Self {
            state: Mutex::new(state),
            events: EventBus::new(),
            kv,
            clock,
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Subscription {
        self.events.subscribe(callback)
    }

    /// Reloads settings, the active shift, the button state and the reminder
    /// index, then fills in any reminder that is missing. Unreadable entries are
    /// logged and left at their defaults. Categories already cancelled by the
    /// restored button progress stay cancelled.
    pub async fn restore(&self) -> Option<ShiftId> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(settings) = self.load::<UserSettings>(USER_SETTINGS_KEY).await {
            state.settings = settings.clamped();
        }

        if let Some(snapshot) = self.load::<ButtonSnapshot>(BUTTON_STATE_KEY).await {
            let mode = state.button.mode();
            state.button = ButtonStateMachine::from_snapshot(mode, snapshot);
        }

        match state.scheduler.restore().await {
            Ok(count) => log::info!("Restored {} reminders", count),
            Err(error) => log::warn!("Could not restore reminder index. error = {}", error),
        }

        state.active_shift = self.load::<Shift>(ACTIVE_SHIFT_KEY).await;
        let restored = state.active_shift.as_ref().map(|shift| shift.id.clone());

        if let Some(shift) = state.active_shift.clone() {
            self.refresh_timings(&mut state, &shift, now);
        }

        self.events.publish(EngineEvent::ActiveShiftChanged {
            shift: state.active_shift.clone(),
        });
        self.evaluate_button(&mut state, now).await;
        plan_ahead(&mut state, now).await;

        restored
    }

    /// Makes `shift` the one governing the button and reminders. `None` clears it.
    pub async fn set_active_shift(&self, shift: Option<Shift>) -> ScheduleOutcome {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(previous) = state.active_shift.take() {
            let cancelled = state.scheduler.cancel_all_for_shift(&previous.id).await;
            log::info!(
                "Cancelled {} reminders of previously active shift {}",
                cancelled,
                previous.id
            );
        }
        state.timings = None;

        let outcome = match shift {
            Some(mut shift) => {
                if shift.days_applied.is_empty() {
                    log::warn!("Active shift {} applies on no weekday", shift.id);
                }
                shift.is_active = true;
                let outcome = self.recalculate(&mut state, &shift, now).await;
                state.active_shift = Some(shift);
                outcome
            }
            None => ScheduleOutcome::default(),
        };

        self.persist(ACTIVE_SHIFT_KEY, state.active_shift.as_ref()).await;
        self.events.publish(EngineEvent::ActiveShiftChanged {
            shift: state.active_shift.clone(),
        });
        self.evaluate_button(&mut state, now).await;

        outcome
    }

    /// Activates whichever entry of `shifts` is marked active.
    pub async fn activate_from(&self, shifts: &[Shift]) -> ScheduleOutcome {
        self.set_active_shift(select_active_shift(shifts).cloned())
            .await
    }

    /// Cancel-then-reschedule for the active shift.
    pub async fn reconcile(&self) -> ScheduleOutcome {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        self.reconcile_locked(&mut state, now).await
    }

    /// Replaces the settings record as a whole and reconciles reminders with it.
    pub async fn replace_settings(&self, settings: UserSettings) -> ScheduleOutcome {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        state.settings = settings.clamped();
        self.persist(USER_SETTINGS_KEY, Some(&state.settings)).await;
        self.reconcile_locked(&mut state, now).await
    }

    pub async fn dispatch(&self, command: ButtonCommand) -> Result<ButtonView, ButtonError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let (button, mut ctx) = state.button_parts(now);
        let transition = button.handle_command(command, &mut ctx).await?;
        let view = button.view(&ctx);

        self.announce(&state, transition).await;
        plan_ahead(&mut state, now).await;
        Ok(view)
    }

    /// Periodic entry point: drops expired reminders, applies the time-driven
    /// reset, fills in the reminders of the cycle due next and reports whether
    /// the button should be shown.
    pub async fn tick(&self) -> ButtonView {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        state.scheduler.cleanup_expired(now).await;
        let view = self.evaluate_button(&mut state, now).await;
        plan_ahead(&mut state, now).await;
        view
    }

    pub async fn button_view(&self) -> ButtonView {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let (button, ctx) = state.button_parts(now);
        button.view(&ctx)
    }

    pub async fn active_shift(&self) -> Option<Shift> {
        self.state.lock().await.active_shift.clone()
    }

    pub async fn settings(&self) -> UserSettings {
        self.state.lock().await.settings.clone()
    }

    /// Timings computed on the last recalculation.
    pub async fn timings(&self) -> Option<ShiftTimings> {
        self.state.lock().await.timings.clone()
    }

    pub async fn stats(&self) -> ReminderStats {
        let now = self.clock.now();
        self.state.lock().await.scheduler.stats(now)
    }

    pub async fn active_shift_reminders(&self) -> Vec<Reminder> {
        let state = self.state.lock().await;
        match &state.active_shift {
            Some(shift) => state.scheduler.reminders_for_shift(&shift.id),
            None => Vec::new(),
        }
    }

    pub async fn next_reminder(&self) -> Option<Reminder> {
        let now = self.clock.now();
        self.state.lock().await.scheduler.next_reminder(now)
    }

    pub async fn schedule_note_reminder(
        &self,
        note_id: &NoteId,
        title: &str,
        at: NaiveDateTime,
    ) -> Result<ReminderId, SkipReason> {
        self.state
            .lock()
            .await
            .scheduler
            .schedule_note_reminder(note_id, title, at)
            .await
    }

    pub async fn cancel_note_reminders(&self, note_id: &str) -> usize {
        self.state
            .lock()
            .await
            .scheduler
            .cancel_all_for_note(note_id)
            .await
    }

    pub async fn schedule_test_reminder(&self, delay: TimeDelta) -> Result<ReminderId, SkipReason> {
        self.state
            .lock()
            .await
            .scheduler
            .schedule_test_reminder(delay)
            .await
    }

    pub async fn cancel_reminder(&self, id: &ReminderId) -> bool {
        self.state.lock().await.scheduler.cancel(id).await
    }

    pub async fn cancel_all_reminders(&self) -> bool {
        self.state.lock().await.scheduler.cancel_all().await
    }

    /// Removes every key this engine has written. In-memory state is kept.
    pub async fn clear_persisted_state(&self) -> Result<usize, StoreError> {
        let _state = self.state.lock().await;
        let keys: Vec<String> = self
            .kv
            .all_keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(KEY_PREFIX))
            .collect();

        self.kv.remove_many(&keys).await?;
        Ok(keys.len())
    }

    async fn reconcile_locked(&self, state: &mut EngineState, now: NaiveDateTime) -> ScheduleOutcome {
        let Some(shift) = state.active_shift.clone() else {
            return ScheduleOutcome::default();
        };

        state.scheduler.cancel_all_for_shift(&shift.id).await;
        self.recalculate(state, &shift, now).await
    }

    async fn recalculate(
        &self,
        state: &mut EngineState,
        shift: &Shift,
        now: NaiveDateTime,
    ) -> ScheduleOutcome {
        self.refresh_timings(state, shift, now);

        let settings = state.settings.clone();
        state.scheduler.schedule_all_for_shift(shift, &settings).await
    }

    fn refresh_timings(&self, state: &mut EngineState, shift: &Shift, now: NaiveDateTime) {
        self.events.publish(EngineEvent::RecalculationStarted {
            shift_id: shift.id.clone(),
        });

        let timings = state.scheduler.calculator().timings(shift, now);
        if timings.is_complete() {
            self.events.publish(EngineEvent::TimingsCalculated {
                shift_id: shift.id.clone(),
                timings: timings.clone(),
            });
        } else {
            log::warn!("Shift {} has unusable times, scheduling what can be placed", shift.id);
            self.events.publish(EngineEvent::RecalculationError {
                shift_id: shift.id.clone(),
                message: "departure or end time could not be computed".to_owned(),
            });
        }
        state.timings = Some(timings);
    }

    async fn evaluate_button(&self, state: &mut EngineState, now: NaiveDateTime) -> ButtonView {
        let (button, mut ctx) = state.button_parts(now);
        let transition = button.evaluate(&mut ctx).await;
        let view = button.view(&ctx);

        if let Some(transition) = transition {
            self.announce(state, transition).await;
        }
        view
    }

    async fn announce(&self, state: &EngineState, transition: Transition) {
        self.persist(BUTTON_STATE_KEY, Some(&state.button.snapshot()))
            .await;
        self.events.publish(EngineEvent::ButtonStateChanged {
            from: transition.from,
            to: transition.to,
            forced: transition.forced,
        });
    }

    async fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match load_json(self.kv.as_ref(), key).await {
            Ok(value) => value,
            Err(error) => {
                log::warn!("Could not load {}. error = {}", key, error);
                None
            }
        }
    }

    /// `None` removes the key.
    async fn persist<T: Serialize + Sync>(&self, key: &str, value: Option<&T>) {
        let result = match value {
            Some(value) => save_json(self.kv.as_ref(), key, value).await,
            None => self.kv.remove(key).await,
        };

        if let Err(error) = result {
            log::warn!("Could not persist {}, will retry on next change. error = {}", key, error);
        }
    }
}

/// Idempotently fills in the reminders of the cycle due next, which retries
/// anything the channel refused earlier. A cycle the user is working through
/// is left alone since its progress has already cancelled some categories.
/// Once it is completed the following work day is planned straight away, so
/// reminders that fire before that day's reset are not lost.
async fn plan_ahead(state: &mut EngineState, now: NaiveDateTime) -> ScheduleOutcome {
    let Some(shift) = state.active_shift.clone() else {
        return ScheduleOutcome::default();
    };
    let calculator = *state.scheduler.calculator();
    let Some(mut date) = calculator.upcoming_cycle_date(&shift, now) else {
        return ScheduleOutcome::default();
    };

    let button_state = state.button.state();
    let in_progress = button_state != ButtonState::GoWork
        && state.button.cycle_reset().is_some()
        && state.button.cycle_reset() == calculator.reset_on(&shift, date);

    if in_progress {
        if button_state != ButtonState::Completed {
            return ScheduleOutcome::default();
        }
        match calculator.work_day_after(&shift, date) {
            Some(next) => date = next,
            None => return ScheduleOutcome::default(),
        }
    }

    let settings = state.settings.clone();
    state.scheduler.schedule_cycle(&shift, &settings, date).await
}

#[cfg(test)]
mod tests;
