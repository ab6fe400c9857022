use serde::{Deserialize, Serialize};

use super::store::PreferenceStore;
use crate::error::{NetMeterError, Result};

pub const KEY_SHOW_SPEED: &str = "show_speed";
pub const KEY_DAILY_LIMIT_ENABLED: &str = "daily_limit_enabled";
pub const KEY_DAILY_LIMIT_MB: &str = "daily_limit_mb";
pub const KEY_SHOW_UP_DOWN: &str = "show_up_down";
pub const KEY_SHOW_WIFI_SIGNAL: &str = "show_wifi_signal";
pub const KEY_UNIT_IN_MB: &str = "unit_in_mb";

const BYTES_PER_MB: f64 = 1_048_576.0;

/// User-facing settings, assembled from the store once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub show_speed: bool,
    pub daily_limit_enabled: bool,
    /// Daily cap in megabytes (1 MB = 1,048,576 bytes). Zero means unset.
    pub daily_limit_mb: f64,
    pub show_up_down: bool,
    pub show_wifi_signal: bool,
    /// History tables print everything in MB instead of auto-scaling.
    pub unit_in_mb: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_speed: true,
            daily_limit_enabled: false,
            daily_limit_mb: 0.0,
            show_up_down: false,
            show_wifi_signal: false,
            unit_in_mb: false,
        }
    }
}

impl Settings {
    pub fn load(store: &dyn PreferenceStore) -> Result<Self> {
        let defaults = Settings::default();

        let daily_limit_mb = store.get_f64(KEY_DAILY_LIMIT_MB, defaults.daily_limit_mb)?;

        Ok(Self {
            show_speed: store.get_bool(KEY_SHOW_SPEED, defaults.show_speed)?,
            daily_limit_enabled: store
                .get_bool(KEY_DAILY_LIMIT_ENABLED, defaults.daily_limit_enabled)?,
            daily_limit_mb: sanitize_limit(daily_limit_mb),
            show_up_down: store.get_bool(KEY_SHOW_UP_DOWN, defaults.show_up_down)?,
            show_wifi_signal: store.get_bool(KEY_SHOW_WIFI_SIGNAL, defaults.show_wifi_signal)?,
            unit_in_mb: store.get_bool(KEY_UNIT_IN_MB, defaults.unit_in_mb)?,
        })
    }

    /// The daily cap in bytes, or `None` when alerts should not run.
    pub fn daily_cap_bytes(&self) -> Option<u64> {
        if !self.daily_limit_enabled || self.daily_limit_mb <= 0.0 {
            return None;
        }
        Some((self.daily_limit_mb * BYTES_PER_MB) as u64)
    }

    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.show_speed {
            self.show_speed = v;
        }
        if let Some(v) = update.daily_limit_enabled {
            self.daily_limit_enabled = v;
        }
        if let Some(v) = update.daily_limit_mb {
            self.daily_limit_mb = sanitize_limit(v);
        }
        if let Some(v) = update.show_up_down {
            self.show_up_down = v;
        }
        if let Some(v) = update.show_wifi_signal {
            self.show_wifi_signal = v;
        }
        if let Some(v) = update.unit_in_mb {
            self.unit_in_mb = v;
        }
    }
}

fn sanitize_limit(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// A partial change to [`Settings`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub show_speed: Option<bool>,
    pub daily_limit_enabled: Option<bool>,
    pub daily_limit_mb: Option<f64>,
    pub show_up_down: Option<bool>,
    pub show_wifi_signal: Option<bool>,
    pub unit_in_mb: Option<bool>,
}

impl SettingsUpdate {
    /// Parse a `key value` pair as typed on the command line.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self> {
        let mut update = SettingsUpdate::default();

        match key {
            KEY_SHOW_SPEED => update.show_speed = Some(parse_flag(key, value)?),
            KEY_DAILY_LIMIT_ENABLED => update.daily_limit_enabled = Some(parse_flag(key, value)?),
            KEY_DAILY_LIMIT_MB => {
                let mb = value.trim().parse::<f64>().map_err(|_| {
                    NetMeterError::config(format!("'{}' expects a number, got '{}'", key, value))
                })?;
                if !mb.is_finite() || mb < 0.0 {
                    return Err(NetMeterError::config(format!(
                        "'{}' must be a non-negative number",
                        key
                    )));
                }
                update.daily_limit_mb = Some(mb);
            }
            KEY_SHOW_UP_DOWN => update.show_up_down = Some(parse_flag(key, value)?),
            KEY_SHOW_WIFI_SIGNAL => update.show_wifi_signal = Some(parse_flag(key, value)?),
            KEY_UNIT_IN_MB => update.unit_in_mb = Some(parse_flag(key, value)?),
            other => {
                return Err(NetMeterError::config(format!(
                    "Unknown setting '{}'",
                    other
                )))
            }
        }

        Ok(update)
    }

    /// Writes every set field to the store in a single batch.
    pub fn persist(&self, store: &dyn PreferenceStore) -> Result<()> {
        let mut entries: Vec<(&str, String)> = Vec::new();

        if let Some(v) = self.show_speed {
            entries.push((KEY_SHOW_SPEED, v.to_string()));
        }
        if let Some(v) = self.daily_limit_enabled {
            entries.push((KEY_DAILY_LIMIT_ENABLED, v.to_string()));
        }
        if let Some(v) = self.daily_limit_mb {
            entries.push((KEY_DAILY_LIMIT_MB, v.to_string()));
        }
        if let Some(v) = self.show_up_down {
            entries.push((KEY_SHOW_UP_DOWN, v.to_string()));
        }
        if let Some(v) = self.show_wifi_signal {
            entries.push((KEY_SHOW_WIFI_SIGNAL, v.to_string()));
        }
        if let Some(v) = self.unit_in_mb {
            entries.push((KEY_UNIT_IN_MB, v.to_string()));
        }

        if entries.is_empty() {
            return Ok(());
        }
        store.set_many(&entries)
    }

    /// Whether this change can alter the rendered display frame.
    pub fn affects_display(&self) -> bool {
        self.show_speed.is_some()
            || self.show_up_down.is_some()
            || self.show_wifi_signal.is_some()
            || self.daily_limit_enabled.is_some()
            || self.daily_limit_mb.is_some()
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(NetMeterError::config(format!(
            "'{}' expects true/false, got '{}'",
            key, value
        ))),
    }
}
