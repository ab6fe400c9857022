//! Today's per-category usage: authoritative baseline plus live accumulator.
//!
//! The authoritative source is expensive, so it is queried at most once per
//! [`BASELINE_REFRESH_SECS`]. Between refreshes every tick's attributed delta is
//! added to the accumulator and the displayed figure is `baseline + accumulator`.
//! Without an authoritative source the aggregator runs in fallback mode and
//! credits deltas straight into persisted per-day counters instead.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone};
use serde::Serialize;

use super::attribution::{AttributedDelta, UsageCategory};
use super::day::{day_key, end_of_day, start_of_day, today};
use crate::core::store::PreferenceStore;
use crate::error::{NetMeterError, Result};
use crate::platform::UsageSource;

pub const BASELINE_REFRESH_SECS: i64 = 60;

/// An authoritative figure above 100 TiB for one day is garbage.
pub const USAGE_SANITY_LIMIT_BYTES: u64 = 100 * 1024 * 1024 * 1024 * 1024;

pub const KEY_RESET_TIMESTAMP: &str = "reset_timestamp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub mobile_bytes: u64,
    pub wifi_bytes: u64,
}

impl UsageTotals {
    pub fn total(&self) -> u64 {
        self.mobile_bytes.saturating_add(self.wifi_bytes)
    }

    pub fn get(&self, category: UsageCategory) -> u64 {
        match category {
            UsageCategory::Mobile => self.mobile_bytes,
            UsageCategory::Wifi => self.wifi_bytes,
        }
    }
}

/// Last authoritative figure for the day. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageBaseline {
    pub mobile_bytes: u64,
    pub wifi_bytes: u64,
    pub queried_at: DateTime<Local>,
    pub day: NaiveDate,
}

/// Bytes seen since the last baseline refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageAccumulator {
    pub mobile_bytes: u64,
    pub wifi_bytes: u64,
}

impl UsageAccumulator {
    pub fn add(&mut self, category: UsageCategory, bytes: u64) {
        match category {
            UsageCategory::Mobile => self.mobile_bytes = self.mobile_bytes.saturating_add(bytes),
            UsageCategory::Wifi => self.wifi_bytes = self.wifi_bytes.saturating_add(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UsageMode {
    Authoritative,
    Fallback,
}

/// Time range to ask the authoritative source for, already clipped to
/// `[max(midnight, reset), min(end of day, now))`. `None` means nothing to count.
pub fn usage_window(
    day: NaiveDate,
    now: DateTime<Local>,
    reset_at: Option<DateTime<Local>>,
) -> Option<(DateTime<Local>, DateTime<Local>)> {
    let mut start = start_of_day(day);
    if let Some(reset_at) = reset_at {
        start = start.max(reset_at);
    }
    let end = end_of_day(day).min(now);

    (end > start).then_some((start, end))
}

/// Query both categories for a window, rejecting implausible figures.
pub fn query_window(
    source: &dyn UsageSource,
    window: Option<(DateTime<Local>, DateTime<Local>)>,
) -> Result<UsageTotals> {
    let Some((start, end)) = window else {
        return Ok(UsageTotals::default());
    };

    let mobile = source.query_usage(UsageCategory::Mobile, start, end)?;
    let wifi = source.query_usage(UsageCategory::Wifi, start, end)?;

    for (name, value) in [("mobile", mobile), ("wifi", wifi)] {
        if value > USAGE_SANITY_LIMIT_BYTES {
            return Err(NetMeterError::usage_source(format!(
                "{} usage of {} bytes is implausible",
                name, value
            )));
        }
    }

    Ok(UsageTotals {
        mobile_bytes: mobile,
        wifi_bytes: wifi,
    })
}

pub fn load_reset_at(store: &dyn PreferenceStore) -> Result<Option<DateTime<Local>>> {
    let millis = store.get_i64(KEY_RESET_TIMESTAMP, 0)?;
    if millis <= 0 {
        return Ok(None);
    }
    Ok(Local.timestamp_millis_opt(millis).single())
}

/// Persisted per-day counters used when no authoritative source is available.
/// Strictly additive.
#[derive(Clone)]
pub struct FallbackLedger {
    store: Arc<dyn PreferenceStore>,
}

impl FallbackLedger {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    fn key(category: UsageCategory, day: NaiveDate) -> String {
        let name = match category {
            UsageCategory::Mobile => "mobile",
            UsageCategory::Wifi => "wifi",
        };
        format!("fallback_{}_{}", name, day_key(day))
    }

    pub fn credit(&self, day: NaiveDate, category: UsageCategory, bytes: u64) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let delta = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.store.add_i64(&Self::key(category, day), delta)?;
        Ok(())
    }

    pub fn usage_for(&self, day: NaiveDate) -> Result<UsageTotals> {
        let mobile = self.store.get_i64(&Self::key(UsageCategory::Mobile, day), 0)?;
        let wifi = self.store.get_i64(&Self::key(UsageCategory::Wifi, day), 0)?;
        Ok(UsageTotals {
            mobile_bytes: mobile.max(0) as u64,
            wifi_bytes: wifi.max(0) as u64,
        })
    }

    pub fn clear(&self, day: NaiveDate) -> Result<()> {
        self.store.remove(&Self::key(UsageCategory::Mobile, day))?;
        self.store.remove(&Self::key(UsageCategory::Wifi, day))
    }
}

/// A pending authoritative refresh. Obtained from
/// [`UsageAggregator::refresh_request`], answered by [`UsageAggregator::apply_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    pub day: NaiveDate,
    pub window: Option<(DateTime<Local>, DateTime<Local>)>,
    pub requested_at: DateTime<Local>,
}

pub struct UsageAggregator {
    day: Option<NaiveDate>,
    baseline: Option<UsageBaseline>,
    accumulator: UsageAccumulator,
    mode: UsageMode,
    force_refresh: bool,
    retry_after: Option<DateTime<Local>>,
    reset_at: Option<DateTime<Local>>,
    ledger: FallbackLedger,
    store: Arc<dyn PreferenceStore>,
}

impl UsageAggregator {
    pub fn new(store: Arc<dyn PreferenceStore>, mode: UsageMode) -> Self {
        let reset_at = load_reset_at(store.as_ref()).unwrap_or_else(|e| {
            log::error!("Failed to read reset timestamp: {}", e);
            None
        });

        Self {
            day: None,
            baseline: None,
            accumulator: UsageAccumulator::default(),
            mode,
            force_refresh: true,
            retry_after: None,
            reset_at,
            ledger: FallbackLedger::new(store.clone()),
            store,
        }
    }

    pub fn mode(&self) -> UsageMode {
        self.mode
    }

    pub fn baseline(&self) -> Option<&UsageBaseline> {
        self.baseline.as_ref()
    }

    pub fn accumulator(&self) -> UsageAccumulator {
        self.accumulator
    }

    /// Switching modes drops the in-memory estimate and forces a resync.
    pub fn set_mode(&mut self, mode: UsageMode) {
        if self.mode == mode {
            return;
        }
        log::info!("Usage aggregation switching to {:?} mode", mode);
        self.mode = mode;
        self.clear_estimate();
        self.force_resync();
    }

    /// Force the baseline to refresh on the next opportunity, bypassing the
    /// refresh interval and any failure backoff.
    pub fn force_resync(&mut self) {
        self.force_refresh = true;
        self.retry_after = None;
    }

    fn clear_estimate(&mut self) {
        self.baseline = None;
        self.accumulator = UsageAccumulator::default();
    }

    /// Drop yesterday's figures when the calendar day has changed.
    fn reconcile_day(&mut self, now: &DateTime<Local>) -> NaiveDate {
        let current = today(now);
        if self.day != Some(current) {
            if let Some(previous) = self.day {
                log::info!("Day rolled over ({} -> {}), resetting usage", previous, current);
            }
            self.day = Some(current);
            self.clear_estimate();
            self.force_resync();
        }
        current
    }

    /// Today's usage estimate. Calling it twice without a tick in between
    /// yields the same figures.
    pub fn current_usage(&mut self, now: DateTime<Local>) -> Result<UsageTotals> {
        let day = self.reconcile_day(&now);

        match self.mode {
            UsageMode::Authoritative => {
                let (mobile, wifi) = self
                    .baseline
                    .as_ref()
                    .map(|b| (b.mobile_bytes, b.wifi_bytes))
                    .unwrap_or((0, 0));
                Ok(UsageTotals {
                    mobile_bytes: mobile.saturating_add(self.accumulator.mobile_bytes),
                    wifi_bytes: wifi.saturating_add(self.accumulator.wifi_bytes),
                })
            }
            UsageMode::Fallback => self.ledger.usage_for(day),
        }
    }

    /// Fold one tick's attributed delta into today's figures.
    pub fn on_tick(&mut self, delta: &AttributedDelta, now: DateTime<Local>) -> Result<()> {
        let day = self.reconcile_day(&now);
        let Some(category) = delta.active_transport.category() else {
            return Ok(());
        };
        let bytes = delta.display_total();

        match self.mode {
            UsageMode::Authoritative => {
                self.accumulator.add(category, bytes);
                Ok(())
            }
            UsageMode::Fallback => self.ledger.credit(day, category, bytes),
        }
    }

    /// A refresh to run now, if one is due.
    pub fn refresh_request(&mut self, now: DateTime<Local>) -> Option<RefreshRequest> {
        if self.mode != UsageMode::Authoritative {
            return None;
        }
        let day = self.reconcile_day(&now);

        if let Some(retry_after) = self.retry_after {
            if now < retry_after {
                return None;
            }
        }

        let due = self.force_refresh
            || match &self.baseline {
                None => true,
                Some(baseline) => {
                    let age = now - baseline.queried_at;
                    // A negative age means the wall clock moved backwards.
                    age >= TimeDelta::seconds(BASELINE_REFRESH_SECS) || age < TimeDelta::zero()
                }
            };
        if !due {
            return None;
        }

        // Picks up resets issued from another process.
        match load_reset_at(self.store.as_ref()) {
            Ok(reset_at) => self.reset_at = reset_at,
            Err(e) => log::error!("Failed to read reset timestamp: {}", e),
        }

        Some(RefreshRequest {
            day,
            window: usage_window(day, now, self.reset_at),
            requested_at: now,
        })
    }

    /// Install the outcome of a refresh. Returns true when a new baseline was
    /// installed. On failure the old baseline and the accumulator stay in place.
    pub fn apply_refresh(&mut self, request: RefreshRequest, result: Result<UsageTotals>) -> bool {
        if self.day != Some(request.day) || self.mode != UsageMode::Authoritative {
            log::debug!("Discarding usage refresh for {}", request.day);
            return false;
        }

        match result {
            Ok(totals) => {
                self.baseline = Some(UsageBaseline {
                    mobile_bytes: totals.mobile_bytes,
                    wifi_bytes: totals.wifi_bytes,
                    queried_at: request.requested_at,
                    day: request.day,
                });
                self.accumulator = UsageAccumulator::default();
                self.force_refresh = false;
                self.retry_after = None;
                true
            }
            Err(e) => {
                log::warn!("Usage baseline refresh failed, keeping estimate: {}", e);
                self.retry_after =
                    Some(request.requested_at + TimeDelta::seconds(BASELINE_REFRESH_SECS));
                false
            }
        }
    }

    /// Synchronous refresh against `source` when one is due.
    pub fn maybe_refresh_baseline(
        &mut self,
        now: DateTime<Local>,
        source: &dyn UsageSource,
    ) -> bool {
        match self.refresh_request(now) {
            Some(request) => {
                let result = query_window(source, request.window);
                self.apply_refresh(request, result)
            }
            None => false,
        }
    }

    /// User-triggered reset: today's usage counts from `now` onwards.
    pub fn reset(&mut self, now: DateTime<Local>) -> Result<()> {
        let day = self.reconcile_day(&now);
        self.store
            .set_i64(KEY_RESET_TIMESTAMP, now.timestamp_millis())?;
        if self.mode == UsageMode::Fallback {
            self.ledger.clear(day)?;
        }

        self.reset_at = Some(now);
        self.clear_estimate();
        self.force_resync();
        Ok(())
    }

    /// True while refreshes are failing and figures are interpolated only.
    pub fn is_degraded(&self) -> bool {
        self.retry_after.is_some()
    }
}
