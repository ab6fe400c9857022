//! Interface counters and active transport detection backed by `sysinfo`.

use parking_lot::Mutex;
use sysinfo::Networks;

use super::wireless;
use super::{CounterSource, NetworkProbe};
use crate::core::telemetry::ActiveTransports;

/// Coarse interface classification from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Loopback,
    Cellular,
    Wifi,
    Ethernet,
    Vpn,
    Other,
}

const CELLULAR_PREFIXES: &[&str] = &["rmnet", "ccmni", "wwan", "wwp", "pdp"];
const VPN_PREFIXES: &[&str] = &["tun", "tap", "wg", "utun", "ipsec", "ppp"];
const WIFI_PREFIXES: &[&str] = &["wlan", "wlp", "wlx", "wl", "ath", "ra"];
const ETHERNET_PREFIXES: &[&str] = &["eth", "enp", "eno", "ens", "enx", "en", "em"];

impl InterfaceKind {
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();

        if lower == "lo" || lower.starts_with("lo0") || lower.contains("loopback") {
            return InterfaceKind::Loopback;
        }
        if CELLULAR_PREFIXES.iter().any(|p| lower.starts_with(p)) || lower.contains("cellular")
        {
            return InterfaceKind::Cellular;
        }
        if VPN_PREFIXES.iter().any(|p| lower.starts_with(p))
            || lower.contains("vpn")
            || lower.contains("wireguard")
        {
            return InterfaceKind::Vpn;
        }
        // Windows uses friendly names such as "Wi-Fi" or "Ethernet 2"
        if WIFI_PREFIXES.iter().any(|p| lower.starts_with(p))
            || lower.contains("wi-fi")
            || lower.contains("wifi")
            || lower.contains("wireless")
        {
            return InterfaceKind::Wifi;
        }
        if ETHERNET_PREFIXES.iter().any(|p| lower.starts_with(p)) || lower.contains("ethernet") {
            return InterfaceKind::Ethernet;
        }

        InterfaceKind::Other
    }
}

/// Reads every interface's cumulative counters on each refresh.
pub struct SysinfoNetworkSource {
    networks: Mutex<Networks>,
}

impl SysinfoNetworkSource {
    pub fn new() -> Self {
        Self {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }

    fn sum_where<F>(&self, mut include: F) -> Option<(u64, u64)>
    where
        F: FnMut(InterfaceKind) -> bool,
    {
        let networks = self.networks.lock();
        let mut seen = false;
        let mut rx = 0u64;
        let mut tx = 0u64;

        for (name, data) in networks.iter() {
            if !include(InterfaceKind::classify(name)) {
                continue;
            }
            seen = true;
            rx = rx.saturating_add(data.total_received());
            tx = tx.saturating_add(data.total_transmitted());
        }

        seen.then_some((rx, tx))
    }
}

impl Default for SysinfoNetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoNetworkSource {
    fn refresh(&self) {
        self.networks.lock().refresh(true);
    }

    fn read_total_bytes(&self) -> Option<(u64, u64)> {
        self.sum_where(|kind| kind != InterfaceKind::Loopback)
    }

    fn read_cellular_bytes(&self) -> Option<(u64, u64)> {
        // No modem present is a real zero, not an unavailable counter.
        Some(
            self.sum_where(|kind| kind == InterfaceKind::Cellular)
                .unwrap_or((0, 0)),
        )
    }
}

impl NetworkProbe for SysinfoNetworkSource {
    /// A transport counts as active when one of its interfaces moved bytes
    /// since the previous refresh.
    fn active_transports(&self) -> ActiveTransports {
        let networks = self.networks.lock();
        let mut active = ActiveTransports::default();

        for (name, data) in networks.iter() {
            if data.received() == 0 && data.transmitted() == 0 {
                continue;
            }
            match InterfaceKind::classify(name) {
                InterfaceKind::Cellular => active.cellular = true,
                InterfaceKind::Wifi => active.wifi = true,
                InterfaceKind::Ethernet => active.ethernet = true,
                InterfaceKind::Vpn => active.vpn = true,
                InterfaceKind::Loopback | InterfaceKind::Other => {}
            }
        }

        active
    }

    fn wifi_signal_percent(&self) -> Option<u8> {
        wireless::read_signal_percent()
    }
}
