use std::sync::{Arc, Mutex};

use crate::{
    button::{ButtonCommand, ButtonError, ButtonMode, ButtonSnapshot},
    models::{ButtonState, ReminderType, Shift, UserSettings},
    storage::{InMemoryKeyValueStore, KeyValueStore, load_json},
    test_utils::{ManualClock, RecordingChannel, at, day_shift, night_shift},
};

use super::*;

struct TestContext {
    clock: Arc<ManualClock>,
    channel: Arc<RecordingChannel>,
    kv: Arc<InMemoryKeyValueStore>,
    controller: ActiveShiftController,
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestContext {
    fn new(now: NaiveDateTime) -> Self {
        Self::with_store(now, Arc::new(InMemoryKeyValueStore::new()))
    }

    fn with_store(now: NaiveDateTime, kv: Arc<InMemoryKeyValueStore>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let channel = Arc::new(RecordingChannel::default());
        let controller = ActiveShiftController::new(
            kv.clone(),
            channel.clone(),
            clock.clone(),
            ControllerOptions::default(),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let _subscription = controller.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        Self {
            clock,
            channel,
            kv,
            controller,
            events,
        }
    }

    fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(EngineEvent::name).collect()
    }

    fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[tokio::test]
pub async fn activating_a_shift_schedules_then_notifies() {
    let ctx = TestContext::new(at(2, 6, 0));

    let outcome = ctx.controller.set_active_shift(Some(day_shift())).await;

    assert_eq!(outcome.scheduled.len(), 8);
    assert_eq!(
        ctx.event_names(),
        vec!["recalculationStarted", "timingsCalculated", "activeShiftChanged"]
    );
    assert_eq!(ctx.controller.active_shift().await.map(|s| s.id), Some("day".to_owned()));
    assert!(ctx.controller.timings().await.is_some_and(|t| t.is_complete()));

    let persisted: Option<Shift> = load_json(ctx.kv.as_ref(), ACTIVE_SHIFT_KEY).await.unwrap();
    assert_eq!(persisted.map(|s| s.id), Some("day".to_owned()));
}

#[tokio::test]
pub async fn switching_shifts_cancels_the_previous_reminders() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.controller.set_active_shift(Some(day_shift())).await;

    ctx.controller.set_active_shift(Some(night_shift())).await;

    assert_eq!(ctx.channel.cancelled_count(), 8);
    assert_eq!(ctx.channel.live_count(), 8);
    let reminders = ctx.controller.active_shift_reminders().await;
    assert_eq!(reminders.len(), 8);
    assert!(reminders.iter().all(|r| r.belongs_to_shift("night")));
}

#[tokio::test]
pub async fn clearing_the_active_shift_cancels_everything_it_owned() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.clear_events();

    let outcome = ctx.controller.set_active_shift(None).await;

    assert!(outcome.scheduled.is_empty());
    assert_eq!(ctx.controller.stats().await.total, 0);
    assert_eq!(ctx.channel.live_count(), 0);
    assert_eq!(ctx.controller.active_shift().await, None);
    assert!(!ctx.controller.button_view().await.visible);
    assert_eq!(ctx.event_names(), vec!["activeShiftChanged"]);
    assert_eq!(ctx.kv.get(ACTIVE_SHIFT_KEY).await.unwrap(), None);
}

#[tokio::test]
pub async fn unusable_shift_times_are_reported_not_fatal() {
    let ctx = TestContext::new(at(2, 6, 0));
    let broken = Shift {
        start_time: "25:99".to_owned(),
        departure_time: String::new(),
        ..day_shift()
    };

    ctx.controller.set_active_shift(Some(broken)).await;

    let names = ctx.event_names();
    assert!(names.contains(&"recalculationError"));
    assert!(!names.contains(&"timingsCalculated"));
    assert_eq!(names.last(), Some(&"activeShiftChanged"));
}

#[test]
pub fn the_active_entry_governs() {
    let inactive = Shift {
        is_active: false,
        ..night_shift()
    };
    let shifts = vec![inactive.clone(), day_shift()];

    assert_eq!(select_active_shift(&shifts).map(|s| s.id.as_str()), Some("day"));
    assert_eq!(select_active_shift(&[inactive]), None);
    assert_eq!(select_active_shift(&[]), None);
}

#[tokio::test]
pub async fn replaced_settings_are_clamped_persisted_and_applied() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.controller.set_active_shift(Some(day_shift())).await;

    ctx.controller
        .replace_settings(UserSettings {
            check_in_enabled: false,
            departure_minutes_before: 500,
            ..UserSettings::default()
        })
        .await;

    let settings = ctx.controller.settings().await;
    assert_eq!(settings.departure_minutes_before, 120);

    let types: Vec<ReminderType> = ctx
        .controller
        .active_shift_reminders()
        .await
        .iter()
        .map(|r| r.reminder_type)
        .collect();
    assert!(!types.contains(&ReminderType::CheckIn));
    assert!(!types.contains(&ReminderType::CheckInUrgent));
    assert!(!types.contains(&ReminderType::Departure), "05:30 is already past");
    assert_eq!(types.len(), 5);

    let persisted: Option<UserSettings> = load_json(ctx.kv.as_ref(), USER_SETTINGS_KEY).await.unwrap();
    assert_eq!(persisted, Some(settings));
}

#[tokio::test]
pub async fn commands_publish_and_persist_the_button_state() {
    let ctx = TestContext::new(at(2, 6, 40));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.clear_events();

    let view = ctx.controller.dispatch(ButtonCommand::Departed).await.unwrap();

    assert_eq!(view.state, ButtonState::WaitingCheckIn);
    assert!(view.visible);
    assert_eq!(
        *ctx.events.lock().unwrap(),
        vec![EngineEvent::ButtonStateChanged {
            from: ButtonState::GoWork,
            to: ButtonState::WaitingCheckIn,
            forced: false,
        }]
    );

    let snapshot: Option<ButtonSnapshot> = load_json(ctx.kv.as_ref(), BUTTON_STATE_KEY).await.unwrap();
    assert_eq!(snapshot.map(|s| s.state), Some(ButtonState::WaitingCheckIn));
}

#[tokio::test]
pub async fn rejected_commands_change_nothing() {
    let ctx = TestContext::new(at(2, 6, 40));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.clear_events();

    let result = ctx.controller.dispatch(ButtonCommand::Arrived).await;

    assert!(matches!(result, Err(ButtonError::InvalidTransition { .. })));
    assert!(ctx.event_names().is_empty());
    assert_eq!(ctx.controller.button_view().await.state, ButtonState::GoWork);
}

#[tokio::test]
pub async fn tick_starts_the_next_work_day() {
    let ctx = TestContext::new(at(2, 6, 40));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.controller.dispatch(ButtonCommand::Departed).await.unwrap();
    ctx.clear_events();

    ctx.clock.set(at(3, 6, 45));
    let view = ctx.controller.tick().await;

    assert_eq!(view.state, ButtonState::GoWork);
    assert!(view.visible);
    assert_eq!(
        *ctx.events.lock().unwrap(),
        vec![EngineEvent::ButtonStateChanged {
            from: ButtonState::WaitingCheckIn,
            to: ButtonState::GoWork,
            forced: true,
        }]
    );

    let stats = ctx.controller.stats().await;
    assert_eq!(stats.expired, 0, "Monday's reminders were cleaned up");
    assert_eq!(stats.total, 8, "Tuesday's reminders were scheduled");
}

#[tokio::test]
pub async fn tick_within_the_same_day_keeps_progress() {
    let ctx = TestContext::new(at(2, 6, 40));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.controller.dispatch(ButtonCommand::Departed).await.unwrap();

    ctx.clock.set(at(2, 12, 0));
    let view = ctx.controller.tick().await;

    assert_eq!(view.state, ButtonState::WaitingCheckIn);
    assert_eq!(ctx.controller.stats().await.total, 5);
}

#[tokio::test]
pub async fn an_untouched_button_still_gets_the_next_days_reminders() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.controller.set_active_shift(Some(day_shift())).await;

    ctx.clock.set(at(3, 6, 45));
    let view = ctx.controller.tick().await;

    assert_eq!(view.state, ButtonState::GoWork);
    let stats = ctx.controller.stats().await;
    assert_eq!(stats.total, 8);
    assert_eq!(stats.upcoming, 8);
    assert!(
        ctx.controller
            .active_shift_reminders()
            .await
            .iter()
            .all(|r| r.scheduled_time.date() == at(3, 0, 0).date())
    );
}

#[tokio::test]
pub async fn evening_tick_plans_reminders_that_fire_before_the_next_reset() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.controller
        .replace_settings(UserSettings {
            weather_prep_enabled: true,
            departure_minutes_before: 90,
            ..UserSettings::default()
        })
        .await;

    ctx.clock.set(at(2, 19, 30));
    ctx.controller.tick().await;

    let tuesday: Vec<(ReminderType, NaiveDateTime)> = ctx
        .controller
        .active_shift_reminders()
        .await
        .iter()
        .map(|r| (r.reminder_type, r.scheduled_time))
        .collect();
    assert!(tuesday.contains(&(ReminderType::Departure, at(3, 6, 0))));
    assert!(tuesday.contains(&(ReminderType::WeatherPrep, at(3, 6, 30))));
    assert_eq!(tuesday.len(), 9);
}

#[tokio::test]
pub async fn completing_the_day_plans_the_next_work_day() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.controller
        .replace_settings(UserSettings {
            weather_prep_enabled: true,
            departure_minutes_before: 90,
            ..UserSettings::default()
        })
        .await;

    ctx.clock.set(at(2, 6, 40));
    for command in [
        ButtonCommand::Departed,
        ButtonCommand::Arrived,
        ButtonCommand::Confirm,
        ButtonCommand::Confirm,
        ButtonCommand::Confirm,
        ButtonCommand::Confirm,
        ButtonCommand::Confirm,
    ] {
        ctx.controller.dispatch(command).await.unwrap();
    }
    assert_eq!(ctx.controller.button_view().await.state, ButtonState::Completed);

    let reminders = ctx.controller.active_shift_reminders().await;
    assert!(
        reminders.iter().all(|r| r.scheduled_time.date() == at(3, 0, 0).date()),
        "Monday's reminders are gone, Tuesday's are planned"
    );
    assert_eq!(reminders.len(), 9);

    ctx.clock.set(at(3, 5, 0));
    ctx.controller.tick().await;
    let types: Vec<ReminderType> = ctx
        .controller
        .active_shift_reminders()
        .await
        .iter()
        .map(|r| r.reminder_type)
        .collect();
    assert!(types.contains(&ReminderType::Departure));
    assert!(types.contains(&ReminderType::WeatherPrep));
    assert_eq!(types.len(), 9);
}

#[tokio::test]
pub async fn refused_reminders_are_retried_on_the_next_tick() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.channel.fail_scheduling(ReminderType::CheckOut);

    let outcome = ctx.controller.set_active_shift(Some(day_shift())).await;
    assert_eq!(outcome.scheduled.len(), 7);
    assert!(outcome.skipped.iter().any(|reason| matches!(
        reason,
        SkipReason::DeliveryFailed {
            reminder_type: ReminderType::CheckOut,
            ..
        }
    )));

    ctx.channel.accept_all();
    ctx.clock.advance(TimeDelta::minutes(1));
    ctx.controller.tick().await;

    let types: Vec<ReminderType> = ctx
        .controller
        .active_shift_reminders()
        .await
        .iter()
        .map(|r| r.reminder_type)
        .collect();
    assert!(types.contains(&ReminderType::CheckOut));
    assert_eq!(types.len(), 8);
    assert_eq!(ctx.channel.schedule_calls(), 8, "Only the refused reminder was registered again");
}

#[tokio::test]
pub async fn ticks_do_not_bring_back_reminders_cancelled_by_progress() {
    let ctx = TestContext::new(at(2, 6, 40));
    ctx.controller.set_active_shift(Some(day_shift())).await;
    for command in [ButtonCommand::Departed, ButtonCommand::Arrived] {
        ctx.controller.dispatch(command).await.unwrap();
    }

    ctx.clock.set(at(2, 7, 0));
    ctx.controller.tick().await;

    let types: Vec<ReminderType> = ctx
        .controller
        .active_shift_reminders()
        .await
        .iter()
        .map(|r| r.reminder_type)
        .collect();
    assert!(!types.contains(&ReminderType::CheckIn));
    assert!(!types.contains(&ReminderType::CheckInUrgent));
}

#[tokio::test]
pub async fn settings_replacement_and_commands_do_not_interleave() {
    let ctx = TestContext::new(at(2, 6, 40));
    ctx.controller.set_active_shift(Some(day_shift())).await;

    let (outcome, command) = tokio::join!(
        ctx.controller.replace_settings(UserSettings {
            break_enabled: false,
            ..UserSettings::default()
        }),
        ctx.controller.dispatch(ButtonCommand::Departed),
    );

    assert_eq!(outcome.scheduled.len(), 7);
    assert!(command.is_ok());
    assert!(
        ctx.controller
            .active_shift_reminders()
            .await
            .iter()
            .all(|r| r.reminder_type != ReminderType::Break)
    );
}

#[tokio::test]
pub async fn restart_restores_shift_button_and_reminders() {
    let kv = Arc::new(InMemoryKeyValueStore::new());
    let before = TestContext::with_store(at(2, 6, 0), kv.clone());
    before.controller.set_active_shift(Some(day_shift())).await;
    before.clock.set(at(2, 6, 40));
    before.controller.dispatch(ButtonCommand::Departed).await.unwrap();

    let after = TestContext::with_store(at(2, 12, 0), kv);
    let restored = after.controller.restore().await;

    assert_eq!(restored, Some("day".to_owned()));
    assert_eq!(after.controller.button_view().await.state, ButtonState::WaitingCheckIn);
    assert_eq!(after.controller.stats().await.total, 5);
    assert_eq!(after.channel.schedule_calls(), 0, "Nothing is registered twice");
}

#[tokio::test]
pub async fn restore_without_saved_state_starts_idle() {
    let ctx = TestContext::new(at(2, 6, 0));

    assert_eq!(ctx.controller.restore().await, None);
    assert_eq!(ctx.controller.settings().await, UserSettings::default());
    assert_eq!(ctx.controller.button_view().await.state, ButtonState::GoWork);
}

#[tokio::test]
pub async fn note_reminders_live_beside_shift_reminders() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.controller.set_active_shift(Some(day_shift())).await;

    let id = ctx
        .controller
        .schedule_note_reminder(&"groceries".to_owned(), "Buy milk", at(2, 18, 0))
        .await
        .unwrap();

    assert_eq!(ctx.controller.stats().await.total, 9);
    assert_eq!(ctx.controller.cancel_note_reminders("groceries").await, 1);
    assert!(!ctx.controller.cancel_reminder(&id).await);
    assert_eq!(ctx.controller.active_shift_reminders().await.len(), 8);
}

#[tokio::test]
pub async fn clearing_persisted_state_leaves_foreign_keys() {
    let ctx = TestContext::new(at(2, 6, 0));
    ctx.kv.set("other.app", b"1".to_vec()).await.unwrap();
    ctx.controller.set_active_shift(Some(day_shift())).await;
    ctx.controller.replace_settings(UserSettings::default()).await;

    let removed = ctx.controller.clear_persisted_state().await.unwrap();

    assert_eq!(removed, 3);
    assert_eq!(ctx.kv.all_keys().await.unwrap(), vec!["other.app".to_owned()]);
    assert!(ctx.controller.active_shift().await.is_some());
}

#[tokio::test]
pub async fn unsubscribed_callbacks_stop_hearing_events() {
    let ctx = TestContext::new(at(2, 6, 0));
    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    let subscription = ctx.controller.subscribe(move |_| *sink.lock().unwrap() += 1);

    ctx.controller.set_active_shift(Some(day_shift())).await;
    subscription.unsubscribe();
    ctx.controller.set_active_shift(None).await;

    assert_eq!(*count.lock().unwrap(), 3);
}

#[tokio::test]
pub async fn concurrent_commands_are_applied_one_at_a_time() {
    let ctx = TestContext::new(at(2, 6, 40));
    ctx.controller.set_active_shift(Some(day_shift())).await;

    let (first, second) = tokio::join!(
        ctx.controller.dispatch(ButtonCommand::Departed),
        ctx.controller.dispatch(ButtonCommand::Departed),
    );

    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    assert_eq!(ctx.controller.button_view().await.state, ButtonState::WaitingCheckIn);
}

#[tokio::test]
pub async fn reduced_mode_reports_collapsed_states() {
    let kv = Arc::new(InMemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(at(2, 6, 40)));
    let controller = ActiveShiftController::new(
        kv,
        Arc::new(RecordingChannel::default()),
        clock,
        ControllerOptions {
            button_mode: ButtonMode::Reduced,
            ..ControllerOptions::default()
        },
    );
    controller.set_active_shift(Some(day_shift())).await;

    let view = controller.dispatch(ButtonCommand::Confirm).await.unwrap();

    assert_eq!(view.state, ButtonState::Complete);
}
