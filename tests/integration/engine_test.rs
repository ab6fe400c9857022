use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use netmeter::core::config::SettingsUpdate;
use netmeter::core::telemetry::alerts::KEY_ALERT_80_FIRED;
use netmeter::core::telemetry::{
    AlertSeverity, EvaluationOutcome, PowerState, TickOutcome, TickReport, Transport, UsageMode,
};

use super::support::{
    at, cellular_only, wifi_with_vpn, FlakyStore, Harness, ScriptedUsage, MB,
};

fn completed(outcome: TickOutcome) -> TickReport {
    match outcome {
        TickOutcome::Completed(report) => report,
        other => panic!("expected a completed tick, got {:?}", other),
    }
}

async fn enable_limit(h: &Harness, mb: f64) {
    h.engine
        .apply_settings(SettingsUpdate {
            daily_limit_enabled: Some(true),
            daily_limit_mb: Some(mb),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_first_tick_without_prime_only_primes() {
    let h = Harness::fallback();
    assert!(matches!(h.engine.tick(at(0)).await, TickOutcome::Primed));

    h.counters.add_local(4096, 0);
    h.probe.set(wifi_with_vpn());
    let report = completed(h.engine.tick(at(1)).await);
    assert_eq!(report.delta.display_rx, 2048);
}

#[tokio::test]
async fn test_vpn_over_wifi_is_halved() {
    let h = Harness::fallback();
    h.counters.set(Some((10_000, 5_000)), Some((0, 0)));
    h.probe.set(wifi_with_vpn());
    h.engine.prime(at(0)).await.unwrap();

    h.counters.set(Some((12_000, 6_000)), Some((0, 0)));
    let report = completed(h.engine.tick(at(1)).await);

    assert_eq!(report.delta.active_transport, Transport::VpnOverWifi);
    assert_eq!(report.delta.display_rx, 1_000);
    assert_eq!(report.delta.display_tx, 500);
    assert_eq!(report.delta.raw_rx, 2_000);
    assert_eq!(report.usage.unwrap().wifi_bytes, 1_500);
}

#[tokio::test]
async fn test_counter_reset_sequence() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());

    let mut deltas = Vec::new();
    for (i, rx) in [1000u64, 1200, 300, 500].into_iter().enumerate() {
        h.counters.set(Some((rx, 0)), Some((rx, 0)));
        match h.engine.tick(at(i as i64)).await {
            TickOutcome::Primed => deltas.push(None),
            TickOutcome::Completed(report) => deltas.push(Some(report.delta.display_rx)),
            other => panic!("unexpected {:?}", other),
        }
    }

    assert_eq!(deltas, vec![None, Some(200), Some(0), Some(200)]);
    let usage = h.engine.current_usage(at(4)).await.unwrap();
    assert_eq!(usage.mobile_bytes, 400);
}

#[tokio::test]
async fn test_implausible_jump_is_dropped() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(3_000_000_000);
    let report = completed(h.engine.tick(at(1)).await);
    assert_eq!(report.delta.display_total(), 0);

    // The baseline moved past the jump.
    h.counters.add_cellular(MB);
    let report = completed(h.engine.tick(at(2)).await);
    assert_eq!(report.delta.display_rx, MB);
}

#[tokio::test]
async fn test_unknown_transport_counts_nothing() {
    let h = Harness::fallback();
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_local(MB, MB);
    let report = completed(h.engine.tick(at(1)).await);

    assert_eq!(report.delta.active_transport, Transport::Unknown);
    assert_eq!(report.usage.unwrap().total(), 0);
}

#[tokio::test]
async fn test_prime_reports_unavailable_counters() {
    let h = Harness::fallback();
    h.counters.set(None, None);

    assert!(h.engine.prime(at(0)).await.is_err());
    assert_eq!(h.presenter.diagnostics.lock().len(), 1);

    // Ticks keep running and read zero.
    h.probe.set(cellular_only());
    let report = completed(h.engine.tick(at(1)).await);
    assert_eq!(report.delta.display_total(), 0);
}

#[tokio::test]
async fn test_authoritative_baseline_plus_accumulator() {
    let h = Harness::authoritative();
    h.usage.set(netmeter::core::telemetry::UsageCategory::Mobile, 10 * MB);
    h.usage.set(netmeter::core::telemetry::UsageCategory::Wifi, 5 * MB);
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    let report = completed(h.engine.tick(at(1)).await);
    assert!(report.baseline_refreshed);
    assert_eq!(report.usage.unwrap().mobile_bytes, 10 * MB);
    assert_eq!(h.usage.queries(), 2);

    // Within the refresh interval, ticks interpolate.
    h.counters.add_cellular(MB);
    let report = completed(h.engine.tick(at(30)).await);
    assert!(!report.baseline_refreshed);
    assert_eq!(report.usage.unwrap().mobile_bytes, 11 * MB);
    assert_eq!(h.usage.queries(), 2);

    // After it, the fresh baseline replaces the estimate.
    h.usage.set(netmeter::core::telemetry::UsageCategory::Mobile, 12 * MB);
    let report = completed(h.engine.tick(at(62)).await);
    assert!(report.baseline_refreshed);
    assert_eq!(report.usage.unwrap().mobile_bytes, 12 * MB);
    assert_eq!(h.engine.usage_mode().await, UsageMode::Authoritative);
}

#[tokio::test]
async fn test_failed_refresh_keeps_estimate() {
    let h = Harness::authoritative();
    h.usage.set(netmeter::core::telemetry::UsageCategory::Mobile, 10 * MB);
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();
    completed(h.engine.tick(at(1)).await);

    h.usage.set_failing(true);
    h.counters.add_cellular(2 * MB);
    let report = completed(h.engine.tick(at(70)).await);

    assert!(!report.baseline_refreshed);
    assert_eq!(report.usage.unwrap().mobile_bytes, 12 * MB);
}

#[tokio::test]
async fn test_wake_credits_sleep_bytes_once() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(50 * MB);
    let wake = h.engine.reconcile_after_wake(at(600)).await.unwrap();
    assert_eq!(wake.sleep_delta.unwrap().display_rx, 50 * MB);
    assert_eq!(wake.usage.mobile_bytes, 50 * MB);

    let report = completed(h.engine.tick(at(601)).await);
    assert_eq!(report.delta.display_total(), 0);
    assert_eq!(report.usage.unwrap().mobile_bytes, 50 * MB);
}

#[tokio::test]
async fn test_failed_wake_credit_is_retried_by_next_tick() {
    let store = Arc::new(FlakyStore::default());
    let h = Harness::with_usage(ScriptedUsage::unavailable(), store.clone());
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(50 * MB);
    store.set_failing(true);
    let err = h.engine.reconcile_after_wake(at(600)).await.unwrap_err();
    assert!(err.is_persistence());

    store.set_failing(false);
    let report = completed(h.engine.tick(at(601)).await);
    assert_eq!(report.delta.display_rx, 50 * MB);
    assert_eq!(report.usage.unwrap().mobile_bytes, 50 * MB);

    let report = completed(h.engine.tick(at(602)).await);
    assert_eq!(report.usage.unwrap().mobile_bytes, 50 * MB);
}

#[tokio::test]
async fn test_failed_tick_credit_is_retried_by_next_tick() {
    let store = Arc::new(FlakyStore::default());
    let h = Harness::with_usage(ScriptedUsage::unavailable(), store.clone());
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(50 * MB);
    store.set_failing(true);
    assert!(matches!(h.engine.tick(at(1)).await, TickOutcome::Abandoned));

    store.set_failing(false);
    let report = completed(h.engine.tick(at(2)).await);
    assert_eq!(report.usage.unwrap().mobile_bytes, 50 * MB);
}

#[tokio::test]
async fn test_wake_refreshes_authoritative_baseline() {
    let h = Harness::authoritative();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();
    completed(h.engine.tick(at(1)).await);

    h.counters.add_cellular(20 * MB);
    h.usage.set(netmeter::core::telemetry::UsageCategory::Mobile, 20 * MB);
    let wake = h.engine.reconcile_after_wake(at(5)).await.unwrap();

    assert!(wake.baseline_refreshed);
    assert_eq!(wake.usage.mobile_bytes, 20 * MB);
}

#[tokio::test]
async fn test_daily_limit_alerts_fire_once_each() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    enable_limit(&h, 100.0).await;
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(81 * MB);
    let report = completed(h.engine.tick(at(1)).await);
    match report.alert {
        Some(EvaluationOutcome::Fired(alert)) => {
            assert_eq!(alert.severity, AlertSeverity::Warning);
            assert_eq!(alert.title, "80% of daily data limit used");
            assert_eq!(alert.body, "81.0 MB (81%) of 100.0 MB daily limit used");
        }
        other => panic!("expected the 80% alert, got {:?}", other),
    }

    h.counters.add_cellular(19 * MB + MB / 5);
    let report = completed(h.engine.tick(at(2)).await);
    match report.alert {
        Some(EvaluationOutcome::Fired(alert)) => {
            assert_eq!(alert.severity, AlertSeverity::Critical);
            assert_eq!(alert.title, "Daily data limit reached");
        }
        other => panic!("expected the 100% alert, got {:?}", other),
    }

    h.counters.add_cellular(5 * MB);
    let report = completed(h.engine.tick(at(3)).await);
    assert!(report.alert.is_none());

    let usage = h.engine.current_usage(at(3)).await.unwrap();
    let settings = h.engine.settings_watch().borrow().clone();
    assert_eq!(
        h.engine.evaluate_alerts(&usage, &settings, at(4)),
        Some(EvaluationOutcome::NoChange)
    );
    assert_eq!(h.presenter.alerts.lock().len(), 2);
}

#[tokio::test]
async fn test_periodic_alert_cadence_follows_power_state() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    enable_limit(&h, 100.0).await;
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(85 * MB);
    let report = completed(h.engine.tick(at(1)).await);
    assert!(matches!(report.alert, Some(EvaluationOutcome::Fired(_))));

    // Usage holds at 85%, so only the cadence triggers evaluations.
    for secs in 2..=30 {
        let report = completed(h.engine.tick(at(secs)).await);
        assert!(report.alert.is_none(), "evaluated early at tick {}", secs);
    }
    let report = completed(h.engine.tick(at(31)).await);
    assert!(matches!(report.alert, Some(EvaluationOutcome::NoChange)));

    h.engine.set_power_state(PowerState::ScreenOff);
    for secs in [41, 51, 61] {
        let report = completed(h.engine.tick(at(secs)).await);
        assert!(matches!(report.alert, Some(EvaluationOutcome::NoChange)));
    }

    h.engine.set_power_state(PowerState::ScreenOn);
    let report = completed(h.engine.tick(at(62)).await);
    assert!(report.alert.is_none());
    assert_eq!(h.presenter.alert_titles().len(), 1);
}

#[tokio::test]
async fn test_periodic_evaluation_fires_when_no_crossing_is_seen() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.set_power_state(PowerState::ScreenOff);
    enable_limit(&h, 100.0).await;
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(85 * MB);
    completed(h.engine.tick(at(10)).await);
    assert_eq!(h.presenter.alert_titles(), vec!["80% of daily data limit used"]);

    // A store write elsewhere clears today's flags; no threshold is crossed
    // again, so only the screen-off cadence can re-fire the alert.
    h.store.set_bool(KEY_ALERT_80_FIRED, false).unwrap();
    let report = completed(h.engine.tick(at(20)).await);
    assert!(matches!(report.alert, Some(EvaluationOutcome::Fired(_))));
}

#[tokio::test]
async fn test_jump_past_both_thresholds_fires_only_critical() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    enable_limit(&h, 100.0).await;
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(120 * MB);
    completed(h.engine.tick(at(1)).await);

    assert_eq!(h.presenter.alert_titles(), vec!["Daily data limit reached"]);
}

#[tokio::test]
async fn test_alerts_rearm_on_a_new_day() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    enable_limit(&h, 10.0).await;
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(9 * MB);
    completed(h.engine.tick(at(1)).await);
    assert_eq!(h.presenter.alerts.lock().len(), 1);

    let tomorrow = at(24 * 3600);
    h.counters.add_cellular(9 * MB);
    completed(h.engine.tick(tomorrow).await);
    assert_eq!(h.presenter.alerts.lock().len(), 2);
}

#[tokio::test]
async fn test_alerts_stay_quiet_when_limit_disabled() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    h.counters.add_cellular(500 * MB);
    let report = completed(h.engine.tick(at(1)).await);

    assert!(report.alert.is_none());
    assert!(h.presenter.alerts.lock().is_empty());
}

#[tokio::test]
async fn test_unchanged_frames_are_not_presented() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    let first = completed(h.engine.tick(at(1)).await);
    let second = completed(h.engine.tick(at(2)).await);
    assert!(first.presented);
    assert!(!second.presented);
    assert_eq!(h.presenter.frame_count(), 1);

    h.counters.add_cellular(2 * MB);
    let third = completed(h.engine.tick(at(3)).await);
    assert!(third.presented);
    assert_eq!(h.presenter.frame_count(), 2);

    let frame = h.presenter.last_frame().unwrap();
    assert_eq!(frame.title, "2.0 MB/s");
    assert_eq!(frame.detail, "Mobile: 2.0 MB | WiFi: 0.0 MB (estimated)");
}

#[tokio::test]
async fn test_settings_change_rerenders_immediately() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();
    h.counters.add_cellular(2048);
    completed(h.engine.tick(at(1)).await);

    let mut watch = h.engine.settings_watch();
    let settings = h
        .engine
        .apply_settings(SettingsUpdate {
            show_up_down: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(settings.show_up_down);
    assert!(watch.has_changed().unwrap());
    assert!(watch.borrow_and_update().show_up_down);
    assert_eq!(h.presenter.frame_count(), 2);
    assert_eq!(
        h.presenter.last_frame().unwrap().title,
        "2 KB/s   ↓ 2 KB/s   ↑ 0 KB/s"
    );

    h.engine
        .apply_settings(SettingsUpdate {
            show_speed: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(h.presenter.clears.load(Ordering::SeqCst), 1);

    let report = completed(h.engine.tick(at(2)).await);
    assert!(report.frame.is_none());
    assert_eq!(h.presenter.frame_count(), 2);
}

#[tokio::test]
async fn test_settings_written_elsewhere_are_picked_up() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();

    SettingsUpdate::from_key_value("show_speed", "false")
        .unwrap()
        .persist(h.store.as_ref())
        .unwrap();

    let report = completed(h.engine.tick(at(1)).await);
    assert!(report.frame.is_none());
    assert!(!h.engine.settings_watch().borrow().show_speed);
}

#[tokio::test]
async fn test_reset_usage_zeroes_today() {
    let h = Harness::fallback();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();
    h.counters.add_cellular(30 * MB);
    completed(h.engine.tick(at(1)).await);

    h.engine.reset_usage(at(2)).await.unwrap();
    assert_eq!(h.engine.current_usage(at(2)).await.unwrap().mobile_bytes, 0);

    h.counters.add_cellular(MB);
    let report = completed(h.engine.tick(at(3)).await);
    assert_eq!(report.usage.unwrap().mobile_bytes, MB);
}

#[tokio::test]
async fn test_overlapping_tick_is_skipped() {
    let h = Harness::authoritative();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();
    h.usage.set_delay(Some(Duration::from_millis(200)));

    let slow = h.engine.tick(at(1));
    let overlapping = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine.tick(at(1)).await
    };
    let (first, second) = tokio::join!(slow, overlapping);

    assert!(matches!(first, TickOutcome::Completed(_)));
    assert!(matches!(second, TickOutcome::Skipped));
}

#[tokio::test]
async fn test_aborted_tick_loses_no_bytes() {
    let h = Harness::authoritative();
    h.probe.set(cellular_only());
    h.engine.prime(at(0)).await.unwrap();
    h.usage.set_delay(Some(Duration::from_millis(200)));
    h.counters.add_cellular(3 * MB);

    let engine = h.engine.clone();
    let handle = tokio::spawn(async move { engine.tick(at(1)).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    h.usage.set_delay(None);
    h.usage.set_failing(true);
    let report = completed(h.engine.tick(at(2)).await);
    assert_eq!(report.delta.display_rx, 3 * MB);
    assert_eq!(report.usage.unwrap().mobile_bytes, 3 * MB);
}
