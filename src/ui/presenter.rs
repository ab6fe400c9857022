//! Output surface for display frames, alerts and diagnostics.

use colored::Colorize;
use std::io::{self, Write};

use crate::core::telemetry::{Alert, AlertSeverity, DisplayFrame};

/// Receives everything the telemetry engine wants shown to the user.
///
/// Implementations must be cheap; they are called from inside the tick.
pub trait Presenter: Send + Sync {
    fn present(&self, frame: &DisplayFrame);

    /// The speed display was switched off.
    fn clear(&self) {}

    fn alert(&self, alert: &Alert);

    fn diagnostic(&self, message: &str);
}

/// Terminal presenter used by `netmeter run`.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }
}

impl Presenter for ConsolePresenter {
    fn present(&self, frame: &DisplayFrame) {
        println!(
            "{}  {}",
            frame.title.bright_cyan().bold(),
            frame.detail.dimmed()
        );
        io::stdout().flush().ok();
    }

    fn clear(&self) {
        println!("{}", "Speed display off".dimmed());
    }

    fn alert(&self, alert: &Alert) {
        let title = match alert.severity {
            AlertSeverity::Critical => alert.title.red().bold(),
            AlertSeverity::Warning => alert.title.yellow().bold(),
            AlertSeverity::Info => alert.title.normal(),
        };
        println!("{} {}", title, alert.body);
    }

    fn diagnostic(&self, message: &str) {
        eprintln!("{} {}", "Warning:".yellow().bold(), message);
    }
}
