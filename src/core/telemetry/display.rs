//! Display frame assembly and change detection.

use serde::Serialize;

use super::alerts::percent_of;
use super::attribution::AttributedDelta;
use super::usage::{UsageMode, UsageTotals};
use crate::core::config::Settings;
use crate::ui::formatters::{format_rate, format_speed, format_usage};

/// What the presenter renders on every changed tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayFrame {
    pub speed_value: String,
    pub speed_unit: String,
    /// Speed plus optional up/down and signal extras.
    pub title: String,
    pub detail: String,
}

impl DisplayFrame {
    /// Identity of the rendered content; equal signatures need no re-render.
    pub fn signature(&self) -> String {
        format!("{}\n{}", self.title, self.detail)
    }
}

pub struct FrameInputs<'a> {
    pub delta: &'a AttributedDelta,
    pub elapsed_secs: f64,
    pub usage: UsageTotals,
    pub mode: UsageMode,
    pub settings: &'a Settings,
    pub wifi_signal: Option<u8>,
}

fn per_second(bytes: u64, elapsed_secs: f64) -> u64 {
    if elapsed_secs <= 0.0 || !elapsed_secs.is_finite() {
        return bytes;
    }
    (bytes as f64 / elapsed_secs) as u64
}

pub fn build_frame(inputs: &FrameInputs<'_>) -> DisplayFrame {
    let total_rate = per_second(inputs.delta.display_total(), inputs.elapsed_secs);
    let (speed_value, speed_unit) = format_speed(total_rate);

    let mut title = format!("{} {}", speed_value, speed_unit);

    if inputs.settings.show_up_down {
        let rx = per_second(inputs.delta.display_rx, inputs.elapsed_secs);
        let tx = per_second(inputs.delta.display_tx, inputs.elapsed_secs);
        title.push_str(&format!("   ↓ {}   ↑ {}", format_rate(rx), format_rate(tx)));
    }

    if inputs.settings.show_wifi_signal {
        if let Some(signal) = inputs.wifi_signal {
            title.push_str(&format!("   \u{1F4F6} {}%", signal));
        }
    }

    let mut detail = format!(
        "Mobile: {} | WiFi: {}",
        format_usage(inputs.usage.mobile_bytes),
        format_usage(inputs.usage.wifi_bytes)
    );
    if inputs.mode == UsageMode::Fallback {
        detail.push_str(" (estimated)");
    }
    if let Some(cap) = inputs.settings.daily_cap_bytes() {
        detail.push_str(&format!(
            " | Limit: {}%",
            percent_of(inputs.usage.mobile_bytes, cap)
        ));
    }

    DisplayFrame {
        speed_value,
        speed_unit: speed_unit.to_string(),
        title,
        detail,
    }
}
