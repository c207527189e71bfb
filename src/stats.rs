//! Self-observability for the sampler.
//!
//! Tracks how long process scans take and how often entities were skipped,
//! so the driver can report whether sampling keeps up with its cadences.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Wall-clock spread of process scans since startup.
#[derive(Clone, Copy, Default)]
struct ScanTimings {
    scans: u64,
    total: Duration,
    last: Duration,
    /// (fastest, slowest); `None` until the first scan.
    range: Option<(Duration, Duration)>,
}

impl ScanTimings {
    fn record(&mut self, elapsed: Duration) {
        self.scans += 1;
        self.total = self.total.saturating_add(elapsed);
        self.last = elapsed;
        self.range = Some(match self.range {
            Some((fastest, slowest)) => (fastest.min(elapsed), slowest.max(elapsed)),
            None => (elapsed, elapsed),
        });
    }

    fn mean(&self) -> Duration {
        if self.scans == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.scans);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Counters and timings shared between the sampler and its readers.
#[derive(Default)]
pub struct SamplerStats {
    scans: Mutex<ScanTimings>,
    vanished_processes: AtomicU64,
    malformed_processes: AtomicU64,
    process_cpu_refreshes: AtomicU64,
    evicted_cpu_entries: AtomicU64,
    network_refreshes: AtomicU64,
}

/// Point-in-time copy of [`SamplerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SamplerStatsSnapshot {
    pub scan_count: u64,
    pub scan_ms_last: f64,
    pub scan_ms_avg: f64,
    pub scan_ms_min: f64,
    pub scan_ms_max: f64,
    pub vanished_processes: u64,
    pub malformed_processes: u64,
    pub process_cpu_refreshes: u64,
    pub evicted_cpu_entries: u64,
    pub network_refreshes: u64,
}

impl SamplerStats {
    pub fn record_scan(&self, elapsed: Duration) {
        self.scans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(elapsed);
    }

    pub fn record_vanished(&self) {
        self.vanished_processes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_processes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_process_cpu_refresh(&self, evicted: usize) {
        self.process_cpu_refreshes.fetch_add(1, Ordering::Relaxed);
        self.evicted_cpu_entries
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_network_refresh(&self) {
        self.network_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SamplerStatsSnapshot {
        let scans = *self.scans.lock().unwrap_or_else(|e| e.into_inner());
        let (fastest, slowest) = scans.range.unwrap_or_default();
        SamplerStatsSnapshot {
            scan_count: scans.scans,
            scan_ms_last: millis(scans.last),
            scan_ms_avg: millis(scans.mean()),
            scan_ms_min: millis(fastest),
            scan_ms_max: millis(slowest),
            vanished_processes: self.vanished_processes.load(Ordering::Relaxed),
            malformed_processes: self.malformed_processes.load(Ordering::Relaxed),
            process_cpu_refreshes: self.process_cpu_refreshes.load(Ordering::Relaxed),
            evicted_cpu_entries: self.evicted_cpu_entries.load(Ordering::Relaxed),
            network_refreshes: self.network_refreshes.load(Ordering::Relaxed),
        }
    }
}
