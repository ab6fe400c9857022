//! Daily data limit alerts.
//!
//! Each threshold (80% and 100%) fires at most once per calendar day. The
//! fired flags are persisted together with the day they belong to, and a
//! mismatched day resets both flags before anything else is looked at.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::day::{day_key, today};
use crate::core::store::PreferenceStore;
use crate::error::Result;
use crate::ui::formatters::format_usage;

pub const KEY_ALERT_DAY: &str = "alert_day_key";
pub const KEY_ALERT_80_FIRED: &str = "alert_80_fired";
pub const KEY_ALERT_100_FIRED: &str = "alert_100_fired";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertThreshold {
    Percent80,
    Percent100,
}

impl AlertThreshold {
    pub fn percent(self) -> u64 {
        match self {
            AlertThreshold::Percent80 => 80,
            AlertThreshold::Percent100 => 100,
        }
    }
}

/// An alert handed to the presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub severity: AlertSeverity,
    pub threshold: AlertThreshold,
    pub usage_bytes: u64,
    pub cap_bytes: u64,
}

impl Alert {
    fn new(threshold: AlertThreshold, usage_bytes: u64, cap_bytes: u64) -> Self {
        let percent = percent_of(usage_bytes, cap_bytes);
        let (title, severity) = match threshold {
            AlertThreshold::Percent80 => ("80% of daily data limit used", AlertSeverity::Warning),
            AlertThreshold::Percent100 => ("Daily data limit reached", AlertSeverity::Critical),
        };

        Self {
            title: title.to_string(),
            body: format!(
                "{} ({}%) of {} daily limit used",
                format_usage(usage_bytes),
                percent,
                format_usage(cap_bytes)
            ),
            severity,
            threshold,
            usage_bytes,
            cap_bytes,
        }
    }
}

/// Whole-percent share of the cap, rounded down.
pub fn percent_of(usage_bytes: u64, cap_bytes: u64) -> u64 {
    if cap_bytes == 0 {
        return 0;
    }
    ((usage_bytes as u128 * 100) / cap_bytes as u128) as u64
}

fn reached(usage_bytes: u64, cap_bytes: u64, threshold: AlertThreshold) -> bool {
    usage_bytes as u128 * 100 >= cap_bytes as u128 * threshold.percent() as u128
}

/// Persisted per-day alert flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDayState {
    pub day_key: String,
    pub alert80_fired: bool,
    pub alert100_fired: bool,
}

impl AlertDayState {
    pub fn load(store: &dyn PreferenceStore) -> Result<Self> {
        Ok(Self {
            day_key: store.get_string(KEY_ALERT_DAY)?.unwrap_or_default(),
            alert80_fired: store.get_bool(KEY_ALERT_80_FIRED, false)?,
            alert100_fired: store.get_bool(KEY_ALERT_100_FIRED, false)?,
        })
    }

    pub fn save(&self, store: &dyn PreferenceStore) -> Result<()> {
        store.set_many(&[
            (KEY_ALERT_DAY, self.day_key.clone()),
            (KEY_ALERT_80_FIRED, self.alert80_fired.to_string()),
            (KEY_ALERT_100_FIRED, self.alert100_fired.to_string()),
        ])
    }

    /// Reset both flags if the state belongs to another day. Returns true when
    /// a reset happened.
    pub fn reconcile(&mut self, today_key: &str) -> bool {
        if self.day_key == today_key {
            return false;
        }
        self.day_key = today_key.to_string();
        self.alert80_fired = false;
        self.alert100_fired = false;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.alert80_fired && self.alert100_fired
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Another evaluation was in flight; nothing was read or written.
    Skipped,
    /// No cap configured.
    Disabled,
    NoChange,
    Fired(Alert),
}

/// Guard for the single-evaluation gate. Dropping it reopens the gate.
pub struct EvaluationGuard<'a> {
    gate: &'a AtomicBool,
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}

pub struct AlertStateMachine {
    store: Arc<dyn PreferenceStore>,
    in_flight: AtomicBool,
}

impl AlertStateMachine {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Claim the evaluation gate, or `None` if an evaluation is running.
    pub fn try_begin(&self) -> Option<EvaluationGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| EvaluationGuard {
                gate: &self.in_flight,
            })
    }

    /// Evaluate today's usage against the cap. Concurrent calls are dropped,
    /// not queued.
    ///
    /// Flags are persisted before an alert is returned, so a failed write never
    /// produces an alert that could fire again on the next evaluation.
    pub fn evaluate(
        &self,
        usage_bytes: u64,
        cap_bytes: Option<u64>,
        now: DateTime<Local>,
    ) -> Result<EvaluationOutcome> {
        let Some(_guard) = self.try_begin() else {
            log::trace!("Alert evaluation already in flight, skipping");
            return Ok(EvaluationOutcome::Skipped);
        };

        let mut state = AlertDayState::load(self.store.as_ref())?;
        if state.reconcile(&day_key(today(&now))) {
            state.save(self.store.as_ref())?;
        }

        let cap_bytes = match cap_bytes {
            Some(cap) if cap > 0 => cap,
            _ => return Ok(EvaluationOutcome::Disabled),
        };

        if state.is_complete() {
            return Ok(EvaluationOutcome::NoChange);
        }

        let threshold = if reached(usage_bytes, cap_bytes, AlertThreshold::Percent100)
            && !state.alert100_fired
        {
            state.alert100_fired = true;
            AlertThreshold::Percent100
        } else if reached(usage_bytes, cap_bytes, AlertThreshold::Percent80)
            && !state.alert80_fired
            && !state.alert100_fired
        {
            state.alert80_fired = true;
            AlertThreshold::Percent80
        } else {
            return Ok(EvaluationOutcome::NoChange);
        };

        state.save(self.store.as_ref())?;

        let alert = Alert::new(threshold, usage_bytes, cap_bytes);
        log::info!("{}: {}", alert.title, alert.body);
        Ok(EvaluationOutcome::Fired(alert))
    }

    pub fn day_state(&self) -> Result<AlertDayState> {
        AlertDayState::load(self.store.as_ref())
    }
}
