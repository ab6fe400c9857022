use chrono::NaiveDate;

const KIB: u64 = 1024;
const MIB: u64 = 1_048_576;
const GIB: u64 = 1_073_741_824;

/// Speeds from this many bytes per second upwards are shown in MB/s.
const MB_PER_SEC_SWITCH: u64 = 1_024_000;

/// Split a speed into its display value and unit, e.g. `("1.5", "MB/s")`.
pub fn format_speed(bytes_per_sec: u64) -> (String, &'static str) {
    if bytes_per_sec >= MB_PER_SEC_SWITCH {
        (format!("{:.1}", bytes_per_sec as f64 / MIB as f64), "MB/s")
    } else {
        ((bytes_per_sec / KIB).to_string(), "KB/s")
    }
}

/// Single-string speed used for the up/down breakdown.
pub fn format_rate(bytes_per_sec: u64) -> String {
    let (value, unit) = format_speed(bytes_per_sec);
    format!("{} {}", value, unit)
}

/// Usage in MB, switching to GB from 1 GiB.
pub fn format_usage(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    }
}

/// Usage for history tables (B, KB, MB, GB), or always MB when `mb_only`.
pub fn format_data(bytes: u64, mb_only: bool) -> String {
    if mb_only {
        return format!("{:.2} MB", bytes as f64 / MIB as f64);
    }

    if bytes >= GIB {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Date label for history rows, e.g. `19 Oct, 2026`.
pub fn format_day(date: NaiveDate) -> String {
    date.format("%d %b, %Y").to_string()
}
