//! Tokio runtime and scheduler for the telemetry pipeline.
//!
//! One scheduler task owns the tick clock. Each tick runs as its own task so
//! shutdown can abort it; power-state changes arrive on a watch channel and
//! swap the tick interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::engine::{TelemetryEngine, TickOutcome};
use crate::error::Result;

/// Screen-on alert evaluations run every this many ticks.
const SCREEN_ON_ALERT_EVERY: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    ScreenOn,
    ScreenOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub tick_interval: Duration,
    /// Periodic alert evaluation runs once per this many ticks.
    pub alert_every_ticks: u32,
}

impl Cadence {
    pub fn for_power(state: PowerState) -> Self {
        match state {
            PowerState::ScreenOn => Self {
                tick_interval: Duration::from_secs(1),
                alert_every_ticks: SCREEN_ON_ALERT_EVERY,
            },
            PowerState::ScreenOff => Self {
                tick_interval: Duration::from_secs(10),
                alert_every_ticks: 1,
            },
        }
    }
}

/// Tick intervals used by [`scheduler_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePlan {
    pub screen_on: Duration,
    pub screen_off: Duration,
}

impl Default for SchedulePlan {
    fn default() -> Self {
        Self {
            screen_on: Cadence::for_power(PowerState::ScreenOn).tick_interval,
            screen_off: Cadence::for_power(PowerState::ScreenOff).tick_interval,
        }
    }
}

impl SchedulePlan {
    pub fn interval_for(&self, state: PowerState) -> Duration {
        match state {
            PowerState::ScreenOn => self.screen_on,
            PowerState::ScreenOff => self.screen_off,
        }
    }
}

/// Wrapper around the Tokio runtime driving the telemetry engine.
pub struct TelemetryRuntime {
    engine: Arc<TelemetryEngine>,

    power_tx: watch::Sender<PowerState>,

    shutdown_tx: broadcast::Sender<()>,

    runtime: tokio::runtime::Runtime,
}

impl TelemetryRuntime {
    /// Build the runtime and spawn the scheduler.
    pub fn start(engine: Arc<TelemetryEngine>, initial: PowerState) -> Result<Self> {
        Self::start_with_plan(engine, initial, SchedulePlan::default())
    }

    pub fn start_with_plan(
        engine: Arc<TelemetryEngine>,
        initial: PowerState,
        plan: SchedulePlan,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .thread_name("netmeter-worker")
            .build()?;

        let (power_tx, power_rx) = watch::channel(initial);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let shutdown = shutdown_tx.subscribe();
        runtime.spawn(scheduler_task(engine.clone(), plan, power_rx, shutdown));

        Ok(Self {
            engine,
            power_tx,
            shutdown_tx,
            runtime,
        })
    }

    pub fn engine(&self) -> &Arc<TelemetryEngine> {
        &self.engine
    }

    pub fn set_power_state(&self, state: PowerState) {
        self.power_tx.send_replace(state);
    }

    /// Stop the scheduler, aborting any tick in flight.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.runtime.shutdown_timeout(Duration::from_secs(2));
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Drives ticks on the cadence of the current power state until shutdown.
///
/// A tick that is still running when the next one is due causes that one to
/// be skipped. Turning the screen back on runs wake reconciliation before
/// ticking resumes.
pub async fn scheduler_task(
    engine: Arc<TelemetryEngine>,
    plan: SchedulePlan,
    mut power_rx: watch::Receiver<PowerState>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut power = *power_rx.borrow_and_update();
    engine.set_power_state(power);

    if let Err(e) = engine.prime(Local::now()).await {
        log::warn!("Starting with unavailable counters: {}", e);
    }

    let mut clock = ticker(plan.interval_for(power));
    let mut in_flight: Option<JoinHandle<TickOutcome>> = None;

    loop {
        tokio::select! {
            _ = clock.tick() => {
                if in_flight.as_ref().is_some_and(|handle| !handle.is_finished()) {
                    log::trace!("Tick still running, skipping");
                    continue;
                }
                let engine = engine.clone();
                in_flight = Some(tokio::spawn(async move {
                    engine.tick(Local::now()).await
                }));
            }
            changed = power_rx.changed() => {
                if changed.is_err() {
                    log::debug!("Power state channel closed");
                    break;
                }
                let next = *power_rx.borrow_and_update();
                if next == power {
                    continue;
                }

                log::info!("Power state {:?} -> {:?}", power, next);
                engine.set_power_state(next);

                if power == PowerState::ScreenOff && next == PowerState::ScreenOn {
                    match engine.reconcile_after_wake(Local::now()).await {
                        Ok(report) => log::debug!(
                            "Wake reconciliation done, baseline refreshed: {}",
                            report.baseline_refreshed
                        ),
                        Err(e) => log::warn!("Wake reconciliation failed: {}", e),
                    }
                }

                power = next;
                clock = ticker(plan.interval_for(power));
            }
            _ = shutdown.recv() => {
                if let Some(handle) = in_flight.take() {
                    handle.abort();
                }
                log::info!("Telemetry scheduler stopped");
                break;
            }
        }
    }
}
