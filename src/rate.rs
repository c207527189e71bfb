//! Rate normalization: turning pairs of cumulative kernel counters into
//! percentages and per-second rates.
//!
//! Every function here is pure. Zero-length deltas yield 0, never NaN.

use crate::system::CpuSample;

/// System-wide CPU usage between two aggregate samples, in [0, 100].
///
/// Total time is the sum of the eight non-guest fields (guest time is already
/// accounted inside user/nice). Non-active time is idle + iowait.
pub fn cpu_usage_percent(prev: &CpuSample, curr: &CpuSample) -> f32 {
    let total_delta = curr.total() as i128 - prev.total() as i128;
    let idle_delta = curr.idle_total() as i128 - prev.idle_total() as i128;

    if total_delta == 0 {
        return 0.0;
    }

    let usage = (total_delta - idle_delta) as f64 / total_delta as f64 * 100.0;
    usage.clamp(0.0, 100.0) as f32
}

/// Per-process CPU usage from a tick delta over wall time.
///
/// Capped at 100 but deliberately not floored: a negative result means the
/// tick counter went backwards (PID reuse) and the caller decides what to do.
pub fn process_cpu_percent(
    prev_ticks: u64,
    curr_ticks: u64,
    elapsed_seconds: f64,
    ticks_per_second: f64,
) -> f64 {
    if elapsed_seconds <= 0.0 || ticks_per_second <= 0.0 {
        return 0.0;
    }
    let tick_delta = curr_ticks as f64 - prev_ticks as f64;
    let usage = (tick_delta / elapsed_seconds) / ticks_per_second * 100.0;
    usage.min(100.0)
}

/// Share of `used` in `total` as a percentage; 0 when total is 0.
pub fn memory_percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0) as f32
}

/// Per-second rate of a monotonic counter. Counter resets (wrap, interface
/// re-creation) report 0 rather than a huge bogus value.
pub fn counter_rate(prev: u64, curr: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds <= 0.0 || curr < prev {
        return 0.0;
    }
    (curr - prev) as f64 / elapsed_seconds
}
