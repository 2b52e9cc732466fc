use std::fmt;

use serde::{Deserialize, Serialize};

/// Stage of the attendance button over one work day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ButtonState {
    #[default]
    GoWork,
    WaitingCheckIn,
    CheckIn,
    Working,
    CheckOut,
    ReadyComplete,
    Complete,
    Completed,
}

impl fmt::Display for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
