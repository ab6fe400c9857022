//! `netmeter history`: per-day usage table with 7 and 30 day totals.

use anyhow::Result;
use chrono::Local;
use colored::Colorize;

use crate::core::config::Settings;
use crate::core::telemetry::{collect_history, UsageHistory, DEFAULT_HISTORY_DAYS};
use crate::platform::UnavailableUsageSource;
use crate::ui::{format_data, format_day};

pub fn execute(matches: &clap::ArgMatches) -> Result<()> {
    let store = super::open_store(matches)?;
    let days = matches
        .get_one::<u32>("days")
        .copied()
        .unwrap_or(DEFAULT_HISTORY_DAYS);

    let settings = Settings::load(store.as_ref())?;
    let history = collect_history(&UnavailableUsageSource, store, Local::now(), days)?;

    if matches.get_flag("json") {
        println!("{}", history.to_json()?);
        return Ok(());
    }

    print_history(&history, settings.unit_in_mb);
    Ok(())
}

fn print_history(history: &UsageHistory, mb_only: bool) {
    println!(
        "{}",
        format!("{:<14} {:>12} {:>12} {:>12}", "Date", "Mobile", "WiFi", "Total")
            .white()
            .bold()
    );
    println!("{}", "─".repeat(53).dimmed());

    for day in &history.days {
        let row = format!(
            "{:<14} {:>12} {:>12} {:>12}",
            format_day(day.date),
            format_data(day.mobile_bytes, mb_only),
            format_data(day.wifi_bytes, mb_only),
            format_data(day.total_bytes(), mb_only)
        );
        if day.total_bytes() == 0 {
            println!("{}", row.dimmed());
        } else {
            println!("{}", row);
        }
    }

    println!("{}", "─".repeat(53).dimmed());
    for (label, totals) in [
        ("Last 7 days", history.summary.last_7_days),
        ("Last 30 days", history.summary.last_30_days),
    ] {
        println!(
            "{} {:>12} {:>12} {:>12}",
            format!("{:<14}", label).cyan().bold(),
            format_data(totals.mobile_bytes, mb_only),
            format_data(totals.wifi_bytes, mb_only),
            format_data(totals.total(), mb_only)
        );
    }

    if history.estimated {
        println!();
        println!(
            "{}",
            "Figures are estimated from interface counters recorded while netmeter ran."
                .dimmed()
        );
    }
}
