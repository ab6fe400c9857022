// Core logic: settings, persistence and the telemetry pipeline

pub mod config;
pub mod store;
pub mod telemetry;

// Re-export commonly used items
pub use config::{Settings, SettingsUpdate};
pub use store::{MemoryStore, PreferenceStore, SqliteStore};
