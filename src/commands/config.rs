use anyhow::{Context, Result};
use colored::Colorize;

use crate::core::config::{
    Settings, SettingsUpdate, KEY_DAILY_LIMIT_ENABLED, KEY_DAILY_LIMIT_MB, KEY_SHOW_SPEED,
    KEY_SHOW_UP_DOWN, KEY_SHOW_WIFI_SIGNAL, KEY_UNIT_IN_MB,
};

pub fn handle(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", sub_matches)) => show(sub_matches),
        Some(("set", sub_matches)) => set(sub_matches),
        _ => {
            println!("Use 'netmeter config --help' for more information.");
            Ok(())
        }
    }
}

/// Key/value rows in display order.
fn rows(settings: &Settings) -> Vec<(&'static str, String)> {
    vec![
        (KEY_SHOW_SPEED, settings.show_speed.to_string()),
        (KEY_SHOW_UP_DOWN, settings.show_up_down.to_string()),
        (KEY_SHOW_WIFI_SIGNAL, settings.show_wifi_signal.to_string()),
        (KEY_DAILY_LIMIT_ENABLED, settings.daily_limit_enabled.to_string()),
        (KEY_DAILY_LIMIT_MB, settings.daily_limit_mb.to_string()),
        (KEY_UNIT_IN_MB, settings.unit_in_mb.to_string()),
    ]
}

fn show(matches: &clap::ArgMatches) -> Result<()> {
    let store = super::open_store(matches)?;
    let settings = Settings::load(store.as_ref())?;

    println!("{}", "Current settings:".white().bold());
    for (key, value) in rows(&settings) {
        println!("  {:<22} {}", key.cyan(), value);
    }
    Ok(())
}

fn set(matches: &clap::ArgMatches) -> Result<()> {
    let key = matches
        .get_one::<String>("key")
        .context("Key argument is required")?;
    let value = matches
        .get_one::<String>("value")
        .context("Value argument is required")?;

    let update = SettingsUpdate::from_key_value(key, value)?;

    let store = super::open_store(matches)?;
    update.persist(store.as_ref())?;
    let settings = Settings::load(store.as_ref())?;

    println!("{}", "✓ Setting saved".green().bold());
    let current = rows(&settings)
        .into_iter()
        .find(|(k, _)| *k == key.as_str());
    if let Some((_, value)) = current {
        println!("  {} = {}", key.cyan(), value);
    }
    if key == KEY_DAILY_LIMIT_MB && !settings.daily_limit_enabled {
        println!(
            "{}",
            format!("Enable alerts with 'netmeter config set {} true'", KEY_DAILY_LIMIT_ENABLED)
                .dimmed()
        );
    }
    Ok(())
}
