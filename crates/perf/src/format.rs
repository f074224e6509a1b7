//! Display formatting for dashboard metrics.

const BITRATE_UNITS: [&str; 4] = ["bps", "Kbps", "Mbps", "Gbps"];

/// Format a bitrate with decimal (1000-based) units and one decimal place.
///
/// ```
/// use hlsmon_perf::format::format_bitrate;
///
/// assert_eq!(format_bitrate(0.0), "0 bps");
/// assert_eq!(format_bitrate(2_500_000.0), "2.5 Mbps");
/// ```
pub fn format_bitrate(bps: f64) -> String {
    if bps == 0.0 {
        return "0 bps".to_string();
    }

    let mut size = bps;
    let mut unit = 0;
    while size >= 1000.0 && unit < BITRATE_UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }

    format!("{:.1} {}", size, BITRATE_UNITS[unit])
}

/// Format a duration in seconds as `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
