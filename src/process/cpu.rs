//! Per-process CPU usage from tick deltas.
//!
//! `ProcessCpuTracker` keeps the previous utime/stime of every PID it has
//! seen and recomputes a CPU percentage on a throttled cadence. Kernel reads
//! happen outside any lock; the whole batch of cache updates is applied under
//! one write lock so readers see either the old or the new pass, never a mix.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::process::scanner::ProcessSnapshot;
use crate::rate::process_cpu_percent;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    // SAFETY: sysconf is safe to call with _SC_CLK_TCK
    // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
    let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if tck > 0 {
        tck as f64
    } else {
        100.0
    }
}

fn get_page_size() -> u64 {
    // SAFETY: sysconf is safe to call with _SC_PAGESIZE
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Memory page size in bytes (for RSS conversion).
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Cache entry for one PID.
#[derive(Debug, Clone, Copy)]
pub struct ProcessCpuEntry {
    pub prev_utime: u64,
    pub prev_stime: u64,
    pub start_time: u64,
    pub cpu_percent: f32,
    pub last_updated: Instant,
    last_seen_pass: u64,
}

impl ProcessCpuEntry {
    fn baseline(p: &ProcessSnapshot, now: Instant, pass: u64) -> Self {
        Self {
            prev_utime: p.utime,
            prev_stime: p.stime,
            start_time: p.start_time,
            cpu_percent: 0.0,
            last_updated: now,
            last_seen_pass: pass,
        }
    }

    fn prev_ticks(&self) -> u64 {
        self.prev_utime.saturating_add(self.prev_stime)
    }
}

#[derive(Default)]
struct CpuCache {
    entries: HashMap<u32, ProcessCpuEntry>,
    pass: u64,
}

/// Result of one applied refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub observed: usize,
    pub updated: usize,
    pub baselined: usize,
    pub evicted: usize,
}

pub struct ProcessCpuTracker {
    cache: StdRwLock<CpuCache>,
    last_refresh: Mutex<Option<Instant>>,
    throttle: Duration,
    ticks_per_second: f64,
    evict_after_passes: u64,
}

impl ProcessCpuTracker {
    /// Creates a tracker using the platform's clock tick rate.
    ///
    /// `evict_after_passes` removes entries whose PID has not been observed
    /// for that many consecutive refresh passes; 0 keeps them forever.
    pub fn new(throttle: Duration, evict_after_passes: u64) -> Self {
        Self::with_ticks_per_second(throttle, evict_after_passes, *CLK_TCK)
    }

    pub fn with_ticks_per_second(
        throttle: Duration,
        evict_after_passes: u64,
        ticks_per_second: f64,
    ) -> Self {
        Self {
            cache: StdRwLock::new(CpuCache::default()),
            last_refresh: Mutex::new(None),
            throttle,
            ticks_per_second,
            evict_after_passes,
        }
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Claims the next refresh slot if the throttle interval has elapsed.
    /// Only one caller wins per interval.
    fn try_claim(&self, now: Instant) -> bool {
        let mut last = self
            .last_refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.throttle => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Recomputes per-process CPU if the throttle interval has elapsed.
    ///
    /// `scan` performs the kernel reads and is only invoked when a refresh is
    /// due; no lock is held while it runs. Returns `None` when throttled.
    pub fn refresh_if_due<F>(&self, scan: F) -> Option<RefreshOutcome>
    where
        F: FnOnce() -> Vec<ProcessSnapshot>,
    {
        if !self.try_claim(Instant::now()) {
            trace!("Process CPU refresh throttled");
            return None;
        }
        let processes = scan();
        Some(self.apply(&processes, Instant::now()))
    }

    /// Applies one scan to the cache as a single batch.
    pub fn apply(&self, processes: &[ProcessSnapshot], now: Instant) -> RefreshOutcome {
        let mut outcome = RefreshOutcome {
            observed: processes.len(),
            ..Default::default()
        };

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.pass += 1;
        let pass = cache.pass;

        for p in processes {
            match cache.entries.get_mut(&p.pid) {
                Some(entry) => {
                    entry.last_seen_pass = pass;

                    if entry.start_time != p.start_time {
                        debug!("PID {} reused by '{}', re-baselining", p.pid, p.name);
                        *entry = ProcessCpuEntry::baseline(p, now, pass);
                        outcome.baselined += 1;
                        continue;
                    }

                    let elapsed = now.saturating_duration_since(entry.last_updated).as_secs_f64();
                    if elapsed <= 0.0 {
                        continue;
                    }

                    let percent = process_cpu_percent(
                        entry.prev_ticks(),
                        p.total_ticks(),
                        elapsed,
                        self.ticks_per_second,
                    );
                    if percent < 0.0 {
                        debug!(
                            "Tick counter of PID {} went backwards, re-baselining",
                            p.pid
                        );
                        *entry = ProcessCpuEntry::baseline(p, now, pass);
                        outcome.baselined += 1;
                        continue;
                    }

                    entry.cpu_percent = percent.clamp(0.0, 100.0) as f32;
                    entry.prev_utime = p.utime;
                    entry.prev_stime = p.stime;
                    entry.last_updated = now;
                    outcome.updated += 1;
                }
                None => {
                    cache
                        .entries
                        .insert(p.pid, ProcessCpuEntry::baseline(p, now, pass));
                    outcome.baselined += 1;
                }
            }
        }

        if self.evict_after_passes > 0 {
            let before = cache.entries.len();
            let limit = self.evict_after_passes;
            cache.entries.retain(|_, e| pass - e.last_seen_pass < limit);
            outcome.evicted = before - cache.entries.len();
        }

        debug!(
            "Process CPU pass {}: {} observed, {} updated, {} baselined, {} evicted",
            pass, outcome.observed, outcome.updated, outcome.baselined, outcome.evicted
        );
        outcome
    }

    /// Last computed CPU percent for `pid`, or 0 if never observed.
    pub fn cpu_percent(&self, pid: u32) -> f32 {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.entries.get(&pid).map_or(0.0, |e| e.cpu_percent)
    }

    pub fn entry(&self, pid: u32) -> Option<ProcessCpuEntry> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.entries.get(&pid).copied()
    }

    /// Copy of every PID's percentage, for table rendering without holding the lock.
    pub fn percents(&self) -> HashMap<u32, f32> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache
            .entries
            .iter()
            .map(|(pid, e)| (*pid, e.cpu_percent))
            .collect()
    }

    pub fn len(&self) -> usize {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::stat::ProcessState;
    use std::sync::Arc;

    fn proc_with_ticks(pid: u32, utime: u64, stime: u64) -> ProcessSnapshot {
        ProcessSnapshot {
            pid,
            name: format!("proc{}", pid),
            state: ProcessState::Running,
            ppid: 1,
            vsize: 0,
            rss_pages: 0,
            utime,
            stime,
            start_time: 1000,
        }
    }

    fn tracker(evict: u64) -> ProcessCpuTracker {
        ProcessCpuTracker::with_ticks_per_second(Duration::from_secs(3), evict, 100.0)
    }

    // -------------------------------------------------------------------------
    // Platform constants
    // -------------------------------------------------------------------------

    #[test]
    fn test_platform_constants_positive() {
        assert!(*CLK_TCK > 0.0);
        assert!(*PAGE_SIZE > 0);
    }

    // -------------------------------------------------------------------------
    // Delta computation
    // -------------------------------------------------------------------------

    #[test]
    fn test_first_observation_is_baseline_only() {
        let t = tracker(0);
        let outcome = t.apply(&[proc_with_ticks(42, 100, 50)], Instant::now());
        assert_eq!(outcome.baselined, 1);
        assert_eq!(t.cpu_percent(42), 0.0);
    }

    #[test]
    fn test_second_pass_reports_percent() {
        let t = tracker(0);
        let t0 = Instant::now();
        t.apply(&[proc_with_ticks(42, 100, 50)], t0);
        // +30 ticks over 1s at 100 Hz = 30%
        let outcome = t.apply(&[proc_with_ticks(42, 120, 60)], t0 + Duration::from_secs(1));
        assert_eq!(outcome.updated, 1);
        let pct = t.cpu_percent(42);
        assert!(pct > 0.0 && pct <= 100.0);
        assert!((pct - 30.0).abs() < 0.01, "got {}", pct);
    }

    #[test]
    fn test_percent_clamped_to_100() {
        let t = tracker(0);
        let t0 = Instant::now();
        t.apply(&[proc_with_ticks(1, 0, 0)], t0);
        t.apply(&[proc_with_ticks(1, 10_000, 0)], t0 + Duration::from_secs(1));
        assert_eq!(t.cpu_percent(1), 100.0);
    }

    #[test]
    fn test_zero_elapsed_keeps_previous_state() {
        let t = tracker(0);
        let t0 = Instant::now();
        t.apply(&[proc_with_ticks(1, 0, 0)], t0);
        let outcome = t.apply(&[proc_with_ticks(1, 50, 0)], t0);
        assert_eq!(outcome.updated, 0);
        assert_eq!(t.entry(1).map(|e| e.prev_utime), Some(0));
    }

    #[test]
    fn test_unknown_pid_is_zero() {
        assert_eq!(tracker(0).cpu_percent(9999), 0.0);
    }

    #[test]
    fn test_pid_reuse_rebaselines() {
        let t = tracker(0);
        let t0 = Instant::now();
        t.apply(&[proc_with_ticks(7, 500, 0)], t0);
        t.apply(&[proc_with_ticks(7, 550, 0)], t0 + Duration::from_secs(1));
        assert!(t.cpu_percent(7) > 0.0);

        let mut reused = proc_with_ticks(7, 5, 0);
        reused.start_time = 9000;
        let outcome = t.apply(&[reused], t0 + Duration::from_secs(2));
        assert_eq!(outcome.baselined, 1);
        assert_eq!(t.cpu_percent(7), 0.0);
        assert_eq!(t.entry(7).map(|e| e.start_time), Some(9000));
    }

    #[test]
    fn test_backwards_ticks_rebaseline() {
        let t = tracker(0);
        let t0 = Instant::now();
        t.apply(&[proc_with_ticks(7, 500, 0)], t0);
        t.apply(&[proc_with_ticks(7, 100, 0)], t0 + Duration::from_secs(1));
        assert_eq!(t.cpu_percent(7), 0.0);
        assert_eq!(t.entry(7).map(|e| e.prev_utime), Some(100));
    }

    // -------------------------------------------------------------------------
    // Eviction
    // -------------------------------------------------------------------------

    #[test]
    fn test_no_eviction_when_disabled() {
        let t = tracker(0);
        let t0 = Instant::now();
        t.apply(&[proc_with_ticks(1, 0, 0), proc_with_ticks(2, 0, 0)], t0);
        for i in 1..10 {
            t.apply(&[proc_with_ticks(1, 0, 0)], t0 + Duration::from_secs(i));
        }
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_eviction_after_missed_passes() {
        let t = tracker(2);
        let t0 = Instant::now();
        t.apply(&[proc_with_ticks(1, 0, 0), proc_with_ticks(2, 0, 0)], t0);
        // PID 2 missed one pass: kept
        t.apply(&[proc_with_ticks(1, 0, 0)], t0 + Duration::from_secs(1));
        assert!(t.entry(2).is_some());
        // Missed two passes: evicted
        let outcome = t.apply(&[proc_with_ticks(1, 0, 0)], t0 + Duration::from_secs(2));
        assert_eq!(outcome.evicted, 1);
        assert!(t.entry(2).is_none());
        assert!(t.entry(1).is_some());
    }

    // -------------------------------------------------------------------------
    // Throttling / concurrency
    // -------------------------------------------------------------------------

    #[test]
    fn test_refresh_if_due_throttles() {
        let t = tracker(0);
        let mut scans = 0;
        assert!(t
            .refresh_if_due(|| {
                scans += 1;
                vec![proc_with_ticks(1, 0, 0)]
            })
            .is_some());
        assert!(t
            .refresh_if_due(|| {
                scans += 1;
                Vec::new()
            })
            .is_none());
        assert_eq!(scans, 1);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_refresh_if_due_zero_throttle_always_runs() {
        let t = ProcessCpuTracker::with_ticks_per_second(Duration::ZERO, 0, 100.0);
        assert!(t.refresh_if_due(Vec::new).is_some());
        assert!(t.refresh_if_due(Vec::new).is_some());
    }

    #[test]
    fn test_readers_never_see_partial_batch() {
        let t = Arc::new(tracker(0));
        let t0 = Instant::now();
        let baseline: Vec<ProcessSnapshot> =
            (1..=200).map(|pid| proc_with_ticks(pid, 0, 0)).collect();
        t.apply(&baseline, t0);

        let busy: Vec<ProcessSnapshot> =
            (1..=200).map(|pid| proc_with_ticks(pid, 10, 0)).collect();
        let writer = {
            let t = Arc::clone(&t);
            std::thread::spawn(move || {
                t.apply(&busy, t0 + Duration::from_secs(1));
            })
        };

        for _ in 0..1000 {
            let percents = t.percents();
            let updated = percents.values().filter(|p| **p > 0.0).count();
            assert!(updated == 0 || updated == 200, "saw partial batch: {}", updated);
        }
        writer.join().expect("writer thread");
        assert!(t.percents().values().all(|p| (*p - 10.0).abs() < 0.01));
    }
}
