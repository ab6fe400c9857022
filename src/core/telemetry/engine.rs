//! The per-tick pipeline: sample, attribute, aggregate, render and alert.
//!
//! A tick never mutates the sampler baseline or today's totals before its
//! last await point. Aborting a tick mid-flight therefore loses nothing: the
//! next tick measures from the same baseline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use tokio::sync::{watch, Mutex};

use super::alerts::{percent_of, AlertStateMachine, AlertThreshold, EvaluationOutcome};
use super::attribution::{attribute, AttributedDelta};
use super::day::today;
use super::display::{build_frame, DisplayFrame, FrameInputs};
use super::runtime::{Cadence, PowerState};
use super::sampler::CounterSampler;
use super::usage::{query_window, RefreshRequest, UsageAggregator, UsageMode, UsageTotals};
use crate::core::config::{Settings, SettingsUpdate};
use crate::core::store::PreferenceStore;
use crate::error::{NetMeterError, Result};
use crate::platform::{CounterSource, NetworkProbe, UsageSource};
use crate::ui::presenter::Presenter;

/// Counter reads attempted at startup before reporting a diagnostic.
const PRIME_ATTEMPTS: usize = 2;

/// Collaborators injected into the engine.
#[derive(Clone)]
pub struct EngineDeps {
    pub counters: Arc<dyn CounterSource>,
    pub probe: Arc<dyn NetworkProbe>,
    pub usage_source: Arc<dyn UsageSource>,
    pub store: Arc<dyn PreferenceStore>,
    pub presenter: Arc<dyn Presenter>,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Another tick held the pipeline.
    Skipped,
    /// First sample taken, nothing to measure against yet.
    Primed,
    /// A store write failed; the bytes are picked up by the next tick.
    Abandoned,
    Completed(TickReport),
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub delta: AttributedDelta,
    /// `None` when today's figures could not be read.
    pub usage: Option<UsageTotals>,
    pub frame: Option<DisplayFrame>,
    /// True when the frame differed from the previous one and was presented.
    pub presented: bool,
    pub baseline_refreshed: bool,
    pub alert: Option<EvaluationOutcome>,
}

#[derive(Debug, Clone)]
pub struct WakeReport {
    /// Bytes that moved while the screen was off.
    pub sleep_delta: Option<AttributedDelta>,
    pub baseline_refreshed: bool,
    pub usage: UsageTotals,
    pub alert: Option<EvaluationOutcome>,
}

/// Inputs of the last rendered frame, so a settings change can re-render
/// without waiting for the next tick.
#[derive(Debug, Clone)]
struct FrameSource {
    delta: AttributedDelta,
    elapsed_secs: f64,
    usage: UsageTotals,
    mode: UsageMode,
    wifi_signal: Option<u8>,
}

struct PipelineState {
    sampler: CounterSampler,
    aggregator: UsageAggregator,
    settings: Settings,
    last_tick_at: Option<DateTime<Local>>,
    ticks_since_alert_check: u32,
    last_signature: Option<String>,
    /// Limit percentage seen by the last tick, and the day it belongs to.
    last_limit_percent: Option<(NaiveDate, u64)>,
    last_frame_source: Option<FrameSource>,
}

pub struct TelemetryEngine {
    counters: Arc<dyn CounterSource>,
    probe: Arc<dyn NetworkProbe>,
    usage_source: Arc<dyn UsageSource>,
    store: Arc<dyn PreferenceStore>,
    presenter: Arc<dyn Presenter>,
    state: Mutex<PipelineState>,
    alerts: AlertStateMachine,
    screen_on: AtomicBool,
    settings_tx: watch::Sender<Settings>,
}

fn mode_for(source: &dyn UsageSource) -> UsageMode {
    if source.is_available() {
        UsageMode::Authoritative
    } else {
        UsageMode::Fallback
    }
}

fn crossed_threshold(previous: Option<u64>, current: u64) -> bool {
    let previous = previous.unwrap_or(0);
    [AlertThreshold::Percent80, AlertThreshold::Percent100]
        .into_iter()
        .any(|t| previous < t.percent() && current >= t.percent())
}

impl TelemetryEngine {
    pub fn new(deps: EngineDeps) -> Self {
        let settings = Settings::load(deps.store.as_ref()).unwrap_or_else(|e| {
            log::error!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        });
        let mode = mode_for(deps.usage_source.as_ref());
        log::info!("Usage aggregation starting in {:?} mode", mode);

        let (settings_tx, _) = watch::channel(settings.clone());

        Self {
            state: Mutex::new(PipelineState {
                sampler: CounterSampler::new(),
                aggregator: UsageAggregator::new(deps.store.clone(), mode),
                settings,
                last_tick_at: None,
                ticks_since_alert_check: 0,
                last_signature: None,
                last_limit_percent: None,
                last_frame_source: None,
            }),
            alerts: AlertStateMachine::new(deps.store.clone()),
            screen_on: AtomicBool::new(true),
            settings_tx,
            counters: deps.counters,
            probe: deps.probe,
            usage_source: deps.usage_source,
            store: deps.store,
            presenter: deps.presenter,
        }
    }

    /// Settings as last applied; updated on every change.
    pub fn settings_watch(&self) -> watch::Receiver<Settings> {
        self.settings_tx.subscribe()
    }

    pub fn power_state(&self) -> PowerState {
        if self.screen_on.load(Ordering::Acquire) {
            PowerState::ScreenOn
        } else {
            PowerState::ScreenOff
        }
    }

    pub fn set_power_state(&self, state: PowerState) {
        self.screen_on
            .store(state == PowerState::ScreenOn, Ordering::Release);
    }

    /// Take the initial counter sample.
    ///
    /// Retries once when the totals are unavailable. If they still are, a
    /// diagnostic goes to the presenter and an error is returned, but the
    /// engine stays usable and later ticks treat the counters as zero.
    pub async fn prime(&self, now: DateTime<Local>) -> Result<()> {
        let mut state = self.state.lock().await;

        let mut snapshot = CounterSampler::sample(self.counters.as_ref(), now);
        let mut attempts = 1;
        while !snapshot.has_totals() && attempts < PRIME_ATTEMPTS {
            log::warn!("Network counters unavailable, retrying");
            snapshot = CounterSampler::sample(self.counters.as_ref(), now);
            attempts += 1;
        }

        let healthy = snapshot.has_totals();
        state.sampler.resync(snapshot);
        state.last_tick_at = Some(now);

        if healthy {
            log::debug!("Counters primed");
            return Ok(());
        }

        let message = "Network counters are unavailable; speed and usage will read zero";
        self.presenter.diagnostic(message);
        Err(NetMeterError::startup(message))
    }

    /// Run one tick. Returns immediately with [`TickOutcome::Skipped`] when a
    /// tick is already in progress.
    pub async fn tick(&self, now: DateTime<Local>) -> TickOutcome {
        let Ok(mut guard) = self.state.try_lock() else {
            log::trace!("Previous tick still running, skipping");
            return TickOutcome::Skipped;
        };
        let state = &mut *guard;

        let settings = self.reload_settings(state);

        let snapshot = CounterSampler::sample(self.counters.as_ref(), now);
        let transport = self.probe.active_transports().classify();

        let Some(deltas) = state.sampler.peek(&snapshot) else {
            state.sampler.resync(snapshot);
            state.last_tick_at = Some(now);
            return TickOutcome::Primed;
        };
        let delta = attribute(&deltas, transport);

        state
            .aggregator
            .set_mode(mode_for(self.usage_source.as_ref()));
        let request = state.aggregator.refresh_request(now);
        let refresh = self.fetch_refresh(request).await;

        if let Err(e) = state.aggregator.on_tick(&delta, now) {
            log::error!("Failed to record usage for this tick: {}", e);
            return TickOutcome::Abandoned;
        }
        state.sampler.resync(snapshot);

        let elapsed_secs = state
            .last_tick_at
            .map(|prev| (now - prev).num_milliseconds() as f64 / 1000.0)
            .filter(|secs| *secs > 0.0)
            .unwrap_or(1.0);
        state.last_tick_at = Some(now);

        let baseline_refreshed = match refresh {
            Some((request, result)) => state.aggregator.apply_refresh(request, result),
            None => false,
        };

        let usage = match state.aggregator.current_usage(now) {
            Ok(usage) => Some(usage),
            Err(e) => {
                log::error!("Failed to read today's usage: {}", e);
                None
            }
        };

        let mut report = TickReport {
            delta,
            usage,
            frame: None,
            presented: false,
            baseline_refreshed,
            alert: None,
        };
        let Some(usage) = usage else {
            return TickOutcome::Completed(report);
        };

        let wifi_signal = if settings.show_wifi_signal {
            self.probe.wifi_signal_percent()
        } else {
            None
        };
        let source = FrameSource {
            delta,
            elapsed_secs,
            usage,
            mode: state.aggregator.mode(),
            wifi_signal,
        };
        let (frame, presented) = self.render(state, &settings, &source);
        state.last_frame_source = Some(source);
        report.frame = frame;
        report.presented = presented;

        report.alert = self.check_alerts(state, &settings, &usage, now);
        TickOutcome::Completed(report)
    }

    /// Account for the screen-off period and bring the baseline up to date.
    ///
    /// Bytes moved while asleep are credited once, to the day of `now`, and
    /// the sampler is rebased so the next tick starts from a fresh reading.
    /// If the credit cannot be stored the sampler keeps its old baseline and
    /// the error is returned; the next tick then counts the sleep bytes.
    pub async fn reconcile_after_wake(&self, now: DateTime<Local>) -> Result<WakeReport> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let settings = self.reload_settings(state);

        let snapshot = CounterSampler::sample(self.counters.as_ref(), now);
        let transport = self.probe.active_transports().classify();
        let sleep_delta = state
            .sampler
            .peek(&snapshot)
            .map(|deltas| attribute(&deltas, transport));

        state
            .aggregator
            .set_mode(mode_for(self.usage_source.as_ref()));
        state.aggregator.force_resync();
        let request = state.aggregator.refresh_request(now);
        let refresh = self.fetch_refresh(request).await;

        if let Some(delta) = &sleep_delta {
            log::info!(
                "Crediting {} bytes moved while the screen was off",
                delta.display_total()
            );
            if let Err(e) = state.aggregator.on_tick(delta, now) {
                log::error!("Failed to credit usage from the screen-off period: {}", e);
                return Err(e);
            }
        }
        state.sampler.resync(snapshot);
        state.last_tick_at = Some(now);
        state.ticks_since_alert_check = 0;

        let baseline_refreshed = match refresh {
            Some((request, result)) => state.aggregator.apply_refresh(request, result),
            None => false,
        };

        let usage = state.aggregator.current_usage(now)?;
        state.last_limit_percent = settings
            .daily_cap_bytes()
            .map(|cap| (today(&now), percent_of(usage.mobile_bytes, cap)));
        let alert = self.evaluate_alerts(&usage, &settings, now);

        Ok(WakeReport {
            sleep_delta,
            baseline_refreshed,
            usage,
            alert,
        })
    }

    /// Check today's mobile usage against the daily limit and present any
    /// alert that fires. `None` when the limit is switched off or the
    /// evaluation failed.
    pub fn evaluate_alerts(
        &self,
        usage: &UsageTotals,
        settings: &Settings,
        now: DateTime<Local>,
    ) -> Option<EvaluationOutcome> {
        if !settings.daily_limit_enabled {
            return None;
        }

        match self
            .alerts
            .evaluate(usage.mobile_bytes, settings.daily_cap_bytes(), now)
        {
            Ok(outcome) => {
                if let EvaluationOutcome::Fired(alert) = &outcome {
                    self.presenter.alert(alert);
                }
                Some(outcome)
            }
            Err(e) => {
                log::error!("Alert evaluation abandoned: {}", e);
                None
            }
        }
    }

    /// Persist a settings change, publish it and re-render straight away
    /// when the display is affected.
    pub async fn apply_settings(&self, update: SettingsUpdate) -> Result<Settings> {
        update.persist(self.store.as_ref())?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        state.settings.apply(&update);
        let settings = state.settings.clone();
        self.settings_tx.send_replace(settings.clone());

        if update.daily_limit_enabled.is_some() || update.daily_limit_mb.is_some() {
            state.last_limit_percent = None;
        }

        if update.affects_display() {
            if let Some(source) = state.last_frame_source.clone() {
                self.render(state, &settings, &source);
            } else if !settings.show_speed && state.last_signature.take().is_some() {
                self.presenter.clear();
            }
        }

        Ok(settings)
    }

    /// Start today's count over from `now`.
    pub async fn reset_usage(&self, now: DateTime<Local>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.aggregator.reset(now)?;
        state.last_limit_percent = None;
        log::info!("Usage reset at {}", now.format("%H:%M:%S"));
        Ok(())
    }

    /// Today's usage estimate, without sampling.
    pub async fn current_usage(&self, now: DateTime<Local>) -> Result<UsageTotals> {
        let mut state = self.state.lock().await;
        state.aggregator.current_usage(now)
    }

    pub async fn usage_mode(&self) -> UsageMode {
        self.state.lock().await.aggregator.mode()
    }

    fn reload_settings(&self, state: &mut PipelineState) -> Settings {
        match Settings::load(self.store.as_ref()) {
            Ok(settings) => {
                if settings != state.settings {
                    log::debug!("Settings changed in the store");
                    state.settings = settings.clone();
                    self.settings_tx.send_replace(settings);
                }
            }
            Err(e) => log::error!("Failed to read settings, keeping previous values: {}", e),
        }
        state.settings.clone()
    }

    /// Run a due baseline query off the async workers.
    async fn fetch_refresh(
        &self,
        request: Option<RefreshRequest>,
    ) -> Option<(RefreshRequest, Result<UsageTotals>)> {
        let request = request?;
        let source = self.usage_source.clone();
        let window = request.window;

        let result =
            match tokio::task::spawn_blocking(move || query_window(source.as_ref(), window)).await
            {
                Ok(result) => result,
                Err(e) => Err(NetMeterError::usage_source(format!(
                    "usage query task failed: {}",
                    e
                ))),
            };

        Some((request, result))
    }

    /// Build the frame and hand it to the presenter if it changed.
    fn render(
        &self,
        state: &mut PipelineState,
        settings: &Settings,
        source: &FrameSource,
    ) -> (Option<DisplayFrame>, bool) {
        if !settings.show_speed {
            if state.last_signature.take().is_some() {
                self.presenter.clear();
            }
            return (None, false);
        }

        let frame = build_frame(&FrameInputs {
            delta: &source.delta,
            elapsed_secs: source.elapsed_secs,
            usage: source.usage,
            mode: source.mode,
            settings,
            wifi_signal: source.wifi_signal,
        });

        let signature = frame.signature();
        if state.last_signature.as_deref() == Some(signature.as_str()) {
            return (Some(frame), false);
        }

        self.presenter.present(&frame);
        state.last_signature = Some(signature);
        (Some(frame), true)
    }

    /// Periodic evaluation on the power-state cadence, plus an immediate one
    /// whenever the limit percentage crosses a threshold.
    fn check_alerts(
        &self,
        state: &mut PipelineState,
        settings: &Settings,
        usage: &UsageTotals,
        now: DateTime<Local>,
    ) -> Option<EvaluationOutcome> {
        let day = today(&now);
        let percent = settings
            .daily_cap_bytes()
            .map(|cap| percent_of(usage.mobile_bytes, cap));
        let previous = state
            .last_limit_percent
            .filter(|(seen_on, _)| *seen_on == day)
            .map(|(_, p)| p);
        let crossed = percent.is_some_and(|p| crossed_threshold(previous, p));
        state.last_limit_percent = percent.map(|p| (day, p));

        state.ticks_since_alert_check += 1;
        let due = state.ticks_since_alert_check
            >= Cadence::for_power(self.power_state()).alert_every_ticks;
        if !due && !crossed {
            return None;
        }

        state.ticks_since_alert_check = 0;
        self.evaluate_alerts(usage, settings, now)
    }
}
