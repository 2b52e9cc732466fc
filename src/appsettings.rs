use std::time::Duration;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::{
    button::ButtonMode,
    controller::ControllerOptions,
    models::{Shift, UserSettings},
    timing::TimingRules,
};

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineSettings {
    pub button_mode: ButtonMode,
    pub poll_interval_secs: u64,
    pub timing: TimingRules,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            button_mode: ButtonMode::Full,
            poll_interval_secs: 60,
            timing: TimingRules::default(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Process configuration. Every section is optional.
///
/// Sources, later ones winning: `shiftbell.*`, `shiftbell.local.*`, then
/// `SHIFTBELL__SECTION__KEY` environment variables. `reminders` and `shift`
/// use the same camelCase keys as their persisted JSON.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppSettings {
    pub engine: EngineSettings,
    pub reminders: UserSettings,
    pub shift: Option<Shift>,
}

impl AppSettings {
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("shiftbell").required(false))
            .add_source(File::with_name("shiftbell.local").required(false))
            .add_source(
                Environment::with_prefix("SHIFTBELL")
                    .prefix_separator("__")
                    .separator("__"),
            );

        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            timing_rules: self.engine.timing,
            button_mode: self.engine.button_mode,
            default_settings: self.reminders.clone(),
        }
    }
}
