// Platform collaborators: raw counters, connectivity and usage history

pub mod network;
pub mod usage_source;
pub mod wireless;

use crate::core::telemetry::ActiveTransports;

// Re-exports
pub use network::{InterfaceKind, SysinfoNetworkSource};
pub use usage_source::{UnavailableUsageSource, UsageSource};

/// Raw cumulative byte counters since boot. `None` means unavailable, which is
/// distinct from zero.
pub trait CounterSource: Send + Sync {
    /// Called once before each group of reads.
    fn refresh(&self) {}

    fn read_total_bytes(&self) -> Option<(u64, u64)>;

    fn read_cellular_bytes(&self) -> Option<(u64, u64)>;
}

/// Connectivity layer.
pub trait NetworkProbe: Send + Sync {
    fn active_transports(&self) -> ActiveTransports;

    fn wifi_signal_percent(&self) -> Option<u8> {
        None
    }
}
