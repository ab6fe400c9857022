//! Per-day usage history for the last N days.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use super::day::{end_of_day, today};
use super::usage::{load_reset_at, query_window, usage_window, FallbackLedger, UsageTotals};
use crate::core::store::PreferenceStore;
use crate::error::Result;
use crate::platform::UsageSource;

pub const DEFAULT_HISTORY_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub mobile_bytes: u64,
    pub wifi_bytes: u64,
}

impl DailyUsage {
    pub fn total_bytes(&self) -> u64 {
        self.mobile_bytes.saturating_add(self.wifi_bytes)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub last_7_days: UsageTotals,
    pub last_30_days: UsageTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageHistory {
    /// Newest first, starting with today.
    pub days: Vec<DailyUsage>,
    pub summary: UsageSummary,
    pub estimated: bool,
}

impl UsageHistory {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Collect `days` days of usage ending today.
///
/// Uses the authoritative source when it is available and the persisted
/// fallback counters otherwise. A day whose query fails counts as zero.
pub fn collect_history(
    source: &dyn UsageSource,
    store: Arc<dyn PreferenceStore>,
    now: DateTime<Local>,
    days: u32,
) -> Result<UsageHistory> {
    let reset_at = load_reset_at(store.as_ref())?;
    let authoritative = source.is_available();
    let ledger = FallbackLedger::new(store);

    let mut entries = Vec::with_capacity(days as usize);
    let mut date = today(&now);

    for _ in 0..days {
        let totals = if authoritative {
            query_window(source, usage_window(date, now, reset_at)).unwrap_or_else(|e| {
                log::warn!("Usage query for {} failed: {}", date, e);
                UsageTotals::default()
            })
        } else if reset_at.is_some_and(|reset| reset >= end_of_day(date)) {
            UsageTotals::default()
        } else {
            ledger.usage_for(date)?
        };

        entries.push(DailyUsage {
            date,
            mobile_bytes: totals.mobile_bytes,
            wifi_bytes: totals.wifi_bytes,
        });

        match date.pred_opt() {
            Some(previous) => date = previous,
            None => break,
        }
    }

    let summary = summarize(&entries);
    Ok(UsageHistory {
        days: entries,
        summary,
        estimated: !authoritative,
    })
}

pub fn summarize(days: &[DailyUsage]) -> UsageSummary {
    let mut summary = UsageSummary::default();

    for (i, day) in days.iter().take(30).enumerate() {
        if i < 7 {
            add_day(&mut summary.last_7_days, day);
        }
        add_day(&mut summary.last_30_days, day);
    }

    summary
}

fn add_day(totals: &mut UsageTotals, day: &DailyUsage) {
    totals.mobile_bytes = totals.mobile_bytes.saturating_add(day.mobile_bytes);
    totals.wifi_bytes = totals.wifi_bytes.saturating_add(day.wifi_bytes);
}
