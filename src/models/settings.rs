use serde::{Deserialize, Serialize};

/// Inclusive bounds for a configurable minute offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteRange {
    pub min: u32,
    pub max: u32,
}

impl MinuteRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: u32) -> u32 {
        value.clamp(self.min, self.max)
    }
}

/// Reminder preferences. Replaced as a whole, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub departure_enabled: bool,
    pub departure_minutes_before: u32,
    pub check_in_enabled: bool,
    pub check_out_enabled: bool,
    pub break_enabled: bool,
    pub overtime_warning_enabled: bool,
    pub overtime_warning_minutes_after: u32,
    pub overtime_limit_enabled: bool,
    pub overtime_limit_minutes_after: u32,
    pub weather_prep_enabled: bool,
}

impl UserSettings {
    pub const DEPARTURE_RANGE: MinuteRange = MinuteRange::new(0, 120);
    pub const OVERTIME_WARNING_RANGE: MinuteRange = MinuteRange::new(5, 240);
    pub const OVERTIME_LIMIT_RANGE: MinuteRange = MinuteRange::new(30, 480);

    /// Copy of the settings with every offset pulled into its declared range.
    /// The overtime limit never fires before the warning.
    pub fn clamped(&self) -> Self {
        let overtime_warning_minutes_after =
            Self::OVERTIME_WARNING_RANGE.clamp(self.overtime_warning_minutes_after);
        let overtime_limit_minutes_after = Self::OVERTIME_LIMIT_RANGE
            .clamp(self.overtime_limit_minutes_after)
            .max(overtime_warning_minutes_after);

        Self {
            departure_minutes_before: Self::DEPARTURE_RANGE.clamp(self.departure_minutes_before),
            overtime_warning_minutes_after,
            overtime_limit_minutes_after,
            ..self.clone()
        }
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            departure_enabled: true,
            departure_minutes_before: 10,
            check_in_enabled: true,
            check_out_enabled: true,
            break_enabled: true,
            overtime_warning_enabled: true,
            overtime_warning_minutes_after: 30,
            overtime_limit_enabled: true,
            overtime_limit_minutes_after: 120,
            weather_prep_enabled: false,
        }
    }
}
