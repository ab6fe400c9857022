//! `netmeter reset`: start today's usage over from now.

use anyhow::Result;
use chrono::Local;

use crate::core::telemetry::{UsageAggregator, UsageMode};
use crate::ui::{confirm, info, success};

pub fn execute(matches: &clap::ArgMatches) -> Result<()> {
    if !matches.get_flag("yes") && !confirm("Reset today's usage counters?")? {
        info("Reset cancelled.");
        return Ok(());
    }

    let store = super::open_store(matches)?;
    let now = Local::now();

    // Without an authoritative source the per-day counters are the figures.
    let mut aggregator = UsageAggregator::new(store, UsageMode::Fallback);
    aggregator.reset(now)?;

    success(&format!(
        "✓ Usage reset. Today's figures now count from {}",
        now.format("%H:%M:%S")
    ));
    Ok(())
}
