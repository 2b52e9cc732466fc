use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::{ButtonState, ReminderType, Shift, UserSettings},
    scheduling::ReminderScheduler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonCommand {
    Departed,
    Arrived,
    Confirm,
    Reset,
}

/// `Reduced` collapses the day to `GoWork -> Complete -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonMode {
    #[default]
    Full,
    Reduced,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ButtonError {
    #[error("cannot apply {command:?} while the button is {state}")]
    InvalidTransition {
        state: ButtonState,
        command: ButtonCommand,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ButtonState,
    pub to: ButtonState,
    /// Set when the transition came from the clock rather than the user.
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonView {
    pub state: ButtonState,
    pub visible: bool,
}

/// Persisted form of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonSnapshot {
    pub state: ButtonState,
    pub cycle_reset: Option<NaiveDateTime>,
}

/// Everything a transition may touch besides the machine itself.
pub struct ButtonContext<'a> {
    pub scheduler: &'a mut ReminderScheduler,
    pub shift: Option<&'a Shift>,
    pub settings: &'a UserSettings,
    pub now: NaiveDateTime,
}

pub struct ButtonStateMachine {
    mode: ButtonMode,
    state: ButtonState,
    /// Reset instant of the work day the current progress belongs to.
    cycle_reset: Option<NaiveDateTime>,
}

impl ButtonStateMachine {
    pub fn new(mode: ButtonMode) -> Self {
        Self {
            mode,
            state: ButtonState::GoWork,
            cycle_reset: None,
        }
    }

    pub fn from_snapshot(mode: ButtonMode, snapshot: ButtonSnapshot) -> Self {
        Self {
            mode,
            state: snapshot.state,
            cycle_reset: snapshot.cycle_reset,
        }
    }

    pub fn snapshot(&self) -> ButtonSnapshot {
        ButtonSnapshot {
            state: self.state(),
            cycle_reset: self.cycle_reset,
        }
    }

    /// Reset instant of the work day the current progress belongs to.
    pub fn cycle_reset(&self) -> Option<NaiveDateTime> {
        self.cycle_reset
    }

    pub fn mode(&self) -> ButtonMode {
        self.mode
    }

    pub fn state(&self) -> ButtonState {
        normalize(self.mode, self.state)
    }

    pub fn view(&self, ctx: &ButtonContext<'_>) -> ButtonView {
        let visible = ctx.shift.is_some_and(|shift| {
            ctx.scheduler
                .calculator()
                .should_show_button(shift, ctx.now)
        });

        ButtonView {
            state: self.state(),
            visible,
        }
    }

    pub async fn handle_command(
        &mut self,
        command: ButtonCommand,
        ctx: &mut ButtonContext<'_>,
    ) -> Result<Transition, ButtonError> {
        let from = self.state();
        let to = next_state(self.mode, from, command)
            .ok_or(ButtonError::InvalidTransition { state: from, command })?;

        if from == ButtonState::GoWork && to != ButtonState::GoWork {
            self.cycle_reset = ctx.shift.and_then(|shift| {
                ctx.scheduler
                    .calculator()
                    .current_reset_time(shift, ctx.now)
            });
        }

        Ok(self.enter(from, to, false, ctx).await)
    }

    /// Time-driven check: once a new work day's reset instant has passed, any
    /// progress from the previous day is dropped.
    pub async fn evaluate(&mut self, ctx: &mut ButtonContext<'_>) -> Option<Transition> {
        let from = self.state();
        if from == ButtonState::GoWork {
            return None;
        }

        let shift = ctx.shift?;
        let calculator = ctx.scheduler.calculator();
        if !calculator.should_reset_button_state(shift, ctx.now) {
            return None;
        }

        let reset = calculator.current_reset_time(shift, ctx.now);
        if reset.is_some() && reset == self.cycle_reset {
            return None;
        }

        log::info!(
            "New work day for shift {}, resetting button from {}",
            shift.id,
            from
        );
        self.cycle_reset = None;
        Some(self.enter(from, ButtonState::GoWork, true, ctx).await)
    }

    async fn enter(
        &mut self,
        from: ButtonState,
        to: ButtonState,
        forced: bool,
        ctx: &mut ButtonContext<'_>,
    ) -> Transition {
        if let Some(shift) = ctx.shift {
            match to {
                ButtonState::CheckIn => {
                    ctx.scheduler
                        .cancel_types_for_shift(
                            &shift.id,
                            &[ReminderType::CheckIn, ReminderType::CheckInUrgent],
                        )
                        .await;
                }
                ButtonState::CheckOut => {
                    ctx.scheduler
                        .cancel_types_for_shift(
                            &shift.id,
                            &[ReminderType::CheckOut, ReminderType::CheckOutUrgent],
                        )
                        .await;
                }
                ButtonState::Completed => {
                    ctx.scheduler.cancel_all_for_shift(&shift.id).await;
                }
                ButtonState::GoWork if from != ButtonState::GoWork => {
                    ctx.scheduler
                        .schedule_all_for_shift(shift, ctx.settings)
                        .await;
                }
                _ => {}
            }
        }

        log::info!("[BUTTON] {} -> {}", from, to);
        self.state = to;

        Transition { from, to, forced }
    }
}

fn normalize(mode: ButtonMode, state: ButtonState) -> ButtonState {
    match (mode, state) {
        (ButtonMode::Full, state) => state,
        (
            ButtonMode::Reduced,
            state @ (ButtonState::GoWork | ButtonState::Complete | ButtonState::Completed),
        ) => state,
        (ButtonMode::Reduced, _) => ButtonState::Complete,
    }
}

fn next_state(mode: ButtonMode, state: ButtonState, command: ButtonCommand) -> Option<ButtonState> {
    use ButtonCommand as C;
    use ButtonState as S;

    if command == C::Reset {
        return Some(S::GoWork);
    }

    match (mode, state, command) {
        (ButtonMode::Full, S::GoWork, C::Departed) => Some(S::WaitingCheckIn),
        (ButtonMode::Full, S::WaitingCheckIn, C::Arrived) => Some(S::CheckIn),
        (ButtonMode::Full, S::CheckIn, C::Confirm) => Some(S::Working),
        (ButtonMode::Full, S::Working, C::Confirm) => Some(S::CheckOut),
        (ButtonMode::Full, S::CheckOut, C::Confirm) => Some(S::ReadyComplete),
        (ButtonMode::Full, S::ReadyComplete, C::Confirm) => Some(S::Complete),
        (ButtonMode::Reduced, S::GoWork, C::Confirm | C::Departed) => Some(S::Complete),
        (_, S::Complete, C::Confirm) => Some(S::Completed),
        _ => None,
    }
}
