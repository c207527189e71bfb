//! Presentation helpers for byte counters.

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Scale at which a network progress bar reads full.
pub const NETWORK_PROGRESS_SCALE: u64 = 2 * GB;

/// Truncates (not rounds) to two decimals so a value never displays higher
/// than it is.
fn two_decimals(v: f64) -> f64 {
    (v * 100.0).floor() / 100.0
}

/// Formats a byte count with 1024-based units.
///
/// Values under 100 of a unit keep two decimals, larger ones are shown as
/// integers; gigabytes always keep two decimals.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KB {
        return format!("{} B", bytes);
    }
    if bytes >= GB {
        return format!("{:.2} GB", two_decimals(bytes as f64 / GB as f64));
    }

    let (value, unit) = if bytes < MB {
        (bytes as f64 / KB as f64, "KB")
    } else {
        (bytes as f64 / MB as f64, "MB")
    };
    if value < 100.0 {
        format!("{:.2} {}", two_decimals(value), unit)
    } else {
        format!("{} {}", value.floor() as u64, unit)
    }
}

/// Fraction of [`NETWORK_PROGRESS_SCALE`] in [0, 1], saturating at 1.
pub fn network_progress(bytes: u64) -> f32 {
    if bytes >= NETWORK_PROGRESS_SCALE {
        return 1.0;
    }
    (bytes as f64 / NETWORK_PROGRESS_SCALE as f64) as f32
}
