//! Wi-Fi signal strength.

const MIN_RSSI_DBM: i32 = -100;
const MAX_RSSI_DBM: i32 = -50;

/// Map an RSSI reading to a 0-100 percentage, linear between -100 and -50 dBm.
pub fn rssi_to_percent(rssi: i32) -> u8 {
    if rssi <= MIN_RSSI_DBM {
        0
    } else if rssi >= MAX_RSSI_DBM {
        100
    } else {
        (((rssi - MIN_RSSI_DBM) * 100) / (MAX_RSSI_DBM - MIN_RSSI_DBM)) as u8
    }
}

/// Signal level (dBm) of the first interface listed in `/proc/net/wireless`.
///
/// ```text
/// Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
///  face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
/// wlan0: 0000   56.  -54.  -256        0      0      0      0      0        0
/// ```
pub fn parse_proc_wireless(content: &str) -> Option<i32> {
    content.lines().skip(2).find_map(|line| {
        let (_, rest) = line.split_once(':')?;
        let level = rest.split_whitespace().nth(2)?;
        let level = level.trim_end_matches('.').parse::<f64>().ok()?;
        Some(level as i32)
    })
}

#[cfg(target_os = "linux")]
pub fn read_signal_percent() -> Option<u8> {
    let content = std::fs::read_to_string("/proc/net/wireless").ok()?;
    parse_proc_wireless(&content).map(rssi_to_percent)
}

#[cfg(not(target_os = "linux"))]
pub fn read_signal_percent() -> Option<u8> {
    None
}
