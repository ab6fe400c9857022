use std::sync::Arc;

use chrono::{Local, NaiveDate, TimeZone};
use tempfile::TempDir;

use netmeter::core::config::{Settings, SettingsUpdate};
use netmeter::core::store::{PreferenceStore, SqliteStore};
use netmeter::core::telemetry::{
    collect_history, AlertStateMachine, EvaluationOutcome, FallbackLedger, UsageCategory,
};
use netmeter::platform::UnavailableUsageSource;

use super::support::MB;

#[test]
fn test_values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("netmeter.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.set_bool("show_speed", false).unwrap();
        store.set_f64("daily_limit_mb", 250.5).unwrap();
        store.add_i64("fallback_mobile_2026-10-19", 1024).unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert!(!store.get_bool("show_speed", true).unwrap());
    assert_eq!(store.get_f64("daily_limit_mb", 0.0).unwrap(), 250.5);
    assert_eq!(
        store.add_i64("fallback_mobile_2026-10-19", 1024).unwrap(),
        2048
    );
}

#[test]
fn test_corrupt_value_is_a_persistence_error() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("netmeter.db")).unwrap();
    store.set_raw("show_speed", "maybe").unwrap();

    let err = Settings::load(&store).unwrap_err();
    assert!(err.is_persistence());
}

#[test]
fn test_settings_round_trip_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("netmeter.db")).unwrap();

    SettingsUpdate::from_key_value("daily_limit_mb", "512")
        .unwrap()
        .persist(&store)
        .unwrap();
    SettingsUpdate::from_key_value("daily_limit_enabled", "true")
        .unwrap()
        .persist(&store)
        .unwrap();

    let settings = Settings::load(&store).unwrap();
    assert!(settings.daily_limit_enabled);
    assert_eq!(settings.daily_cap_bytes(), Some(512 * MB));
    assert!(settings.show_speed);
}

#[test]
fn test_alert_flags_persist_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("netmeter.db");
    let now = Local.with_ymd_and_hms(2026, 10, 19, 18, 0, 0).unwrap();

    let first = AlertStateMachine::new(Arc::new(SqliteStore::open(&path).unwrap()));
    assert!(matches!(
        first.evaluate(90 * MB, Some(100 * MB), now).unwrap(),
        EvaluationOutcome::Fired(_)
    ));

    // A restarted process must not repeat today's alert.
    let second = AlertStateMachine::new(Arc::new(SqliteStore::open(&path).unwrap()));
    assert_eq!(
        second.evaluate(95 * MB, Some(100 * MB), now).unwrap(),
        EvaluationOutcome::NoChange
    );
    assert!(second.day_state().unwrap().alert80_fired);
}

#[test]
fn test_history_from_persisted_fallback_counters() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn PreferenceStore> =
        Arc::new(SqliteStore::open(&dir.path().join("netmeter.db")).unwrap());

    let ledger = FallbackLedger::new(store.clone());
    let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
    let week_ago = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
    ledger.credit(today, UsageCategory::Mobile, 3 * MB).unwrap();
    ledger.credit(today, UsageCategory::Wifi, MB).unwrap();
    ledger.credit(week_ago, UsageCategory::Mobile, 10 * MB).unwrap();

    let now = Local.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap();
    let history = collect_history(&UnavailableUsageSource, store, now, 30).unwrap();

    assert_eq!(history.days.len(), 30);
    assert_eq!(history.days[0].total_bytes(), 4 * MB);
    assert_eq!(history.days[7].mobile_bytes, 10 * MB);
    assert_eq!(history.summary.last_7_days.mobile_bytes, 3 * MB);
    assert_eq!(history.summary.last_30_days.mobile_bytes, 13 * MB);
    assert!(history.estimated);
}
