//! Display helpers for post metadata.

use chrono::{DateTime, Utc};

/// Coarse age of `date` relative to `now`, e.g. `5m ago` or `3d ago`.
/// Anything ten years or older is shown as an RFC 3339 timestamp.
pub fn time_elapsed(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - date).num_seconds().max(0) as f64 / 60.0;
    if minutes < 60.0 {
        return format!("{}m ago", minutes.floor());
    }
    let hours = minutes / 60.0;
    if hours < 24.0 {
        return format!("{}h ago", hours.floor());
    }
    let days = hours / 24.0;
    if days < 7.0 {
        return format!("{}d ago", days.floor());
    }
    let months = days / 30.0;
    if months < 12.0 {
        return format!("{}mon ago", months.floor());
    }
    let years = months / 12.0;
    if years < 10.0 {
        return format!("{}y ago", years.floor());
    }
    date.to_rfc3339()
}

/// Compact count with at most three significant digits: `999`, `1.2K`, `12.3M`.
pub fn compact_number(value: i64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];

    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs() as f64;

    for (scale, suffix) in UNITS {
        if abs >= scale {
            return format!("{}{}{}", sign, significant(abs / scale), suffix);
        }
    }
    format!("{}{}", sign, abs)
}

fn significant(value: f64) -> String {
    let decimals = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    };
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    let text = format!("{:.*}", decimals as usize, rounded);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
