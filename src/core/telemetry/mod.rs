//! Network telemetry: counter sampling, traffic attribution, daily usage
//! aggregation, limit alerts and the tick scheduler that drives them.

pub mod alerts;
pub mod attribution;
pub mod day;
mod display;
pub mod engine;
pub mod history;
pub mod runtime;
pub mod sampler;
pub mod usage;

pub use alerts::{
    percent_of, Alert, AlertDayState, AlertSeverity, AlertStateMachine, AlertThreshold,
    EvaluationOutcome,
};
pub use attribution::{attribute, ActiveTransports, AttributedDelta, Transport, UsageCategory};
pub use display::{build_frame, DisplayFrame, FrameInputs};
pub use engine::{EngineDeps, TelemetryEngine, TickOutcome, TickReport, WakeReport};
pub use history::{collect_history, DailyUsage, UsageHistory, UsageSummary, DEFAULT_HISTORY_DAYS};
pub use runtime::{scheduler_task, Cadence, PowerState, SchedulePlan, TelemetryRuntime};
pub use sampler::{CounterAnomaly, CounterDeltas, CounterSampler, CounterSnapshot};
pub use usage::{
    FallbackLedger, UsageAccumulator, UsageAggregator, UsageBaseline, UsageMode, UsageTotals,
};
