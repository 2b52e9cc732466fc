mod key_value;
mod reminder_store;

pub use key_value::{InMemoryKeyValueStore, KeyValueStore, StoreError, load_json, save_json};
pub use reminder_store::{REMINDER_INDEX_KEY, ReminderStats, ReminderStore};
