// UI and formatting module

pub mod formatters;
pub mod presenter;
pub mod prompts;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_data, format_day, format_rate, format_speed, format_usage};
pub use presenter::{ConsolePresenter, Presenter};
pub use prompts::{confirm, error, info, success, warn};
