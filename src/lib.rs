pub mod appsettings;
pub mod button;
pub mod clock;
pub mod controller;
pub mod events;
pub mod models;
pub mod scheduling;
pub mod storage;
pub mod timing;
pub mod worker;

#[cfg(test)]
mod test_utils;

pub use button::{ButtonCommand, ButtonError, ButtonMode, ButtonView};
pub use clock::{Clock, SystemClock};
pub use controller::{ActiveShiftController, ControllerOptions, select_active_shift};
pub use events::{EngineEvent, EventBus, Subscription};
pub use timing::{ShiftSpan, ShiftTimeCalculator, ShiftTimings, TimingRules};
pub use worker::spawn_button_worker;
