//! Assigns measured byte deltas to a transport and corrects VPN double counting.

use serde::{Deserialize, Serialize};

use super::sampler::CounterDeltas;

/// Transport kinds reported as active by the connectivity layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTransports {
    pub cellular: bool,
    pub wifi: bool,
    pub ethernet: bool,
    pub vpn: bool,
}

impl ActiveTransports {
    /// The transport that carries the default route.
    ///
    /// A local link (Wi-Fi or Ethernet) wins over cellular, matching how mobile
    /// stacks pick the default network when both are up.
    pub fn classify(&self) -> Transport {
        if self.wifi || self.ethernet {
            if self.vpn {
                Transport::VpnOverWifi
            } else {
                Transport::Wifi
            }
        } else if self.cellular {
            Transport::Cellular
        } else {
            Transport::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Cellular,
    Wifi,
    VpnOverWifi,
    Unknown,
}

/// Which usage bucket a transport's bytes belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageCategory {
    Mobile,
    Wifi,
}

impl Transport {
    pub fn category(self) -> Option<UsageCategory> {
        match self {
            Transport::Cellular => Some(UsageCategory::Mobile),
            Transport::Wifi | Transport::VpnOverWifi => Some(UsageCategory::Wifi),
            Transport::Unknown => None,
        }
    }
}

/// Per-tick deltas after attribution. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributedDelta {
    pub display_rx: u64,
    pub display_tx: u64,
    pub active_transport: Transport,
    /// Uncorrected total deltas, kept for bookkeeping.
    pub raw_rx: u64,
    pub raw_tx: u64,
}

impl AttributedDelta {
    pub fn display_total(&self) -> u64 {
        self.display_rx.saturating_add(self.display_tx)
    }
}

/// Produce display deltas for the active transport.
///
/// Cellular counters already exclude tunnel overhead, so they are used as-is.
/// On a local link the non-cellular share is used; with a VPN up that share is
/// halved because full-tunnel traffic is counted on both the physical and the
/// tunnel interface. Split-tunnel setups are over-corrected by this.
pub fn attribute(deltas: &CounterDeltas, transport: Transport) -> AttributedDelta {
    let (display_rx, display_tx) = match transport {
        Transport::Cellular => deltas.cellular(),
        Transport::Wifi => non_cellular(deltas),
        Transport::VpnOverWifi => {
            let (rx, tx) = non_cellular(deltas);
            (rx / 2, tx / 2)
        }
        Transport::Unknown => (0, 0),
    };

    AttributedDelta {
        display_rx,
        display_tx,
        active_transport: transport,
        raw_rx: deltas.total_rx,
        raw_tx: deltas.total_tx,
    }
}

fn non_cellular(deltas: &CounterDeltas) -> (u64, u64) {
    (
        deltas.total_rx.saturating_sub(deltas.cellular_rx),
        deltas.total_tx.saturating_sub(deltas.cellular_tx),
    )
}
