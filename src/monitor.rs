//! Shared monitor state.
//!
//! `Monitor` owns every metric store and is shared between the sampling tasks
//! (writers) and any number of readers. Each metric family sits behind its own
//! lock or atomic; no operation here holds two of them at once, and readers
//! always get copies.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::collectors::{
    default_thermal_candidates, interface_addresses, read_fan, read_thermal, FanSample,
    InterfaceRate, NetworkCounterCache, RxCounters, ThermalSample, TxCounters,
};
use crate::config::Config;
use crate::history::{AtomicF32, MetricHistory};
use crate::process::{
    list_all_processes, ProcessCounts, ProcessCpuTracker, ProcessSnapshot, ProcessState,
    PAGE_SIZE,
};
use crate::rate::{cpu_usage_percent, memory_percent};
use crate::stats::{SamplerStats, SamplerStatsSnapshot};
use crate::system::{
    read_cpu_aggregate, read_kernel_process_counters, read_memory_snapshot, CpuSample,
    KernelProcessCounters, MemorySnapshot,
};

/// Paths and tunables a [`Monitor`] is built from.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub disk_path: PathBuf,
    pub thermal_candidates: Vec<PathBuf>,
    pub history_capacity: usize,
    pub process_cpu_throttle: Duration,
    pub evict_after_passes: u64,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        let sys_root = config.sys_root();
        let thermal_candidates = config
            .thermal_candidates
            .clone()
            .unwrap_or_else(|| default_thermal_candidates(&sys_root));
        Self {
            proc_root: config.proc_root(),
            sys_root,
            disk_path: config.disk_path(),
            thermal_candidates,
            history_capacity: config.history.capacity,
            process_cpu_throttle: config.process_cpu_throttle(),
            evict_after_passes: config.process_cpu.evict_after_passes,
        }
    }

    /// Settings rooted at alternate proc/sys trees, everything else default.
    pub fn with_roots(proc_root: &Path, sys_root: &Path) -> Self {
        let config = Config {
            proc_root: Some(proc_root.to_path_buf()),
            sys_root: Some(sys_root.to_path_buf()),
            ..Config::default()
        };
        Self::from_config(&config)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One row of the process table: scan data joined with derived percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub pid: u32,
    pub name: String,
    pub state: ProcessState,
    pub ppid: u32,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub rss_bytes: u64,
}

struct CpuState {
    prev: Mutex<Option<CpuSample>>,
    current: AtomicF32,
    history: MetricHistory<f32>,
}

/// Latest sensor reading plus its history. The reading is replaced as a
/// whole, so the availability flag and the value always belong together.
struct SensorState<S, H> {
    current: RwLock<S>,
    history: MetricHistory<H>,
}

impl<S: Copy + Default, H: Copy> SensorState<S, H> {
    fn new(capacity: usize) -> Self {
        Self {
            current: RwLock::new(S::default()),
            history: MetricHistory::new(capacity),
        }
    }

    /// Stores `sample` and returns the one it replaced.
    fn replace(&self, sample: S) -> S {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *current, sample)
    }

    fn load(&self) -> S {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Default)]
struct ProcessListState {
    processes: Vec<ProcessSnapshot>,
    counts: ProcessCounts,
    refreshed_at: Option<Instant>,
}

pub struct Monitor {
    settings: MonitorSettings,
    cpu: CpuState,
    thermal: SensorState<ThermalSample, f32>,
    fan: SensorState<FanSample, u32>,
    memory: RwLock<MemorySnapshot>,
    processes: RwLock<ProcessListState>,
    process_cpu: ProcessCpuTracker,
    network: NetworkCounterCache,
    stats: SamplerStats,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Self {
        let capacity = settings.history_capacity;
        Self {
            cpu: CpuState {
                prev: Mutex::new(None),
                current: AtomicF32::new(0.0),
                history: MetricHistory::new(capacity),
            },
            thermal: SensorState::new(capacity),
            fan: SensorState::new(capacity),
            memory: RwLock::new(MemorySnapshot::default()),
            processes: RwLock::new(ProcessListState::default()),
            process_cpu: ProcessCpuTracker::new(
                settings.process_cpu_throttle,
                settings.evict_after_passes,
            ),
            network: NetworkCounterCache::new(),
            stats: SamplerStats::default(),
            settings,
        }
    }

    /// Monitor over the live `/proc` and `/sys`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(MonitorSettings::from_config(config))
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // CPU
    // -------------------------------------------------------------------------

    /// Takes a CPU sample and derives usage against the previous one.
    ///
    /// The first call only stores the baseline and returns `None`; later
    /// calls update the current value and, unless paused, the history.
    pub fn update_cpu(&self) -> Option<f32> {
        let curr = read_cpu_aggregate(&self.settings.proc_root);
        let prev = self
            .cpu
            .prev
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(curr)?;

        let usage = cpu_usage_percent(&prev, &curr);
        self.cpu.current.store(usage);
        self.cpu.history.record(usage);
        trace!("CPU usage {:.1}%", usage);
        Some(usage)
    }

    pub fn cpu_usage_now(&self) -> f32 {
        self.cpu.current.load()
    }

    pub fn cpu_history_snapshot(&self) -> Vec<f32> {
        self.cpu.history.snapshot()
    }

    pub fn set_cpu_history_paused(&self, paused: bool) {
        self.cpu.history.set_paused(paused);
    }

    pub fn is_cpu_history_paused(&self) -> bool {
        self.cpu.history.is_paused()
    }

    // -------------------------------------------------------------------------
    // Processes
    // -------------------------------------------------------------------------

    /// Scans every process and replaces the stored list. Returns the count.
    pub fn refresh_process_list(&self) -> usize {
        let processes = list_all_processes(&self.settings.proc_root, &self.stats);
        let counts = ProcessCounts::from_snapshots(&processes);
        let total = processes.len();

        let mut state = self.processes.write().unwrap_or_else(|e| e.into_inner());
        state.processes = processes;
        state.counts = counts;
        state.refreshed_at = Some(Instant::now());
        total
    }

    /// Copy of the last scan, sorted by PID.
    pub fn process_list(&self) -> Vec<ProcessSnapshot> {
        self.processes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .processes
            .clone()
    }

    pub fn process_counts(&self) -> ProcessCounts {
        self.processes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .counts
    }

    /// When the process list was last replaced, if ever.
    pub fn process_list_refreshed_at(&self) -> Option<Instant> {
        self.processes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .refreshed_at
    }

    pub fn kernel_process_counters(&self) -> KernelProcessCounters {
        read_kernel_process_counters(&self.settings.proc_root)
    }

    /// Recomputes per-process CPU if the throttle interval has passed.
    /// Returns whether a pass ran.
    pub fn refresh_process_cpu_if_due(&self) -> bool {
        let proc_root = &self.settings.proc_root;
        match self
            .process_cpu
            .refresh_if_due(|| list_all_processes(proc_root, &self.stats))
        {
            Some(outcome) => {
                self.stats.record_process_cpu_refresh(outcome.evicted);
                true
            }
            None => false,
        }
    }

    /// Last computed CPU percent of `pid`; 0 if it was never observed.
    pub fn process_cpu_percent(&self, pid: u32) -> f32 {
        self.process_cpu.cpu_percent(pid)
    }

    pub fn process_cpu_tracker(&self) -> &ProcessCpuTracker {
        &self.process_cpu
    }

    /// Process table rows: the last scan joined with CPU and memory shares.
    pub fn process_rows(&self) -> Vec<ProcessRow> {
        let processes = self.process_list();
        let percents = self.process_cpu.percents();
        let total_ram = self.memory_snapshot().total_ram;
        let page_size = *PAGE_SIZE;

        processes
            .into_iter()
            .map(|p| {
                let rss_bytes = p.rss_bytes(page_size);
                ProcessRow {
                    cpu_percent: percents.get(&p.pid).copied().unwrap_or(0.0),
                    memory_percent: memory_percent(rss_bytes, total_ram),
                    rss_bytes,
                    pid: p.pid,
                    ppid: p.ppid,
                    state: p.state,
                    name: p.name,
                }
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Memory, swap and disk
    // -------------------------------------------------------------------------

    /// Recomputes the memory snapshot from scratch and stores it.
    pub fn refresh_memory(&self) -> MemorySnapshot {
        let snapshot = read_memory_snapshot(&self.settings.proc_root, &self.settings.disk_path);
        *self.memory.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
        snapshot
    }

    /// Last stored memory snapshot; all zeros before the first refresh.
    pub fn memory_snapshot(&self) -> MemorySnapshot {
        *self.memory.read().unwrap_or_else(|e| e.into_inner())
    }

    // -------------------------------------------------------------------------
    // Thermal
    // -------------------------------------------------------------------------

    /// Probes the thermal candidates. Availability is re-decided every call;
    /// history only grows while a sensor answers.
    pub fn update_thermal(&self) -> ThermalSample {
        let sample = read_thermal(&self.settings.thermal_candidates);
        let previous = self.thermal.replace(sample);
        if previous.available != sample.available {
            debug!("Thermal sensor availability changed to {}", sample.available);
        }

        if sample.available {
            self.thermal.history.record(sample.celsius);
        }
        sample
    }

    pub fn thermal_now(&self) -> ThermalSample {
        self.thermal.load()
    }

    pub fn thermal_available(&self) -> bool {
        self.thermal.load().available
    }

    pub fn thermal_history_snapshot(&self) -> Vec<f32> {
        self.thermal.history.snapshot()
    }

    pub fn set_thermal_history_paused(&self, paused: bool) {
        self.thermal.history.set_paused(paused);
    }

    // -------------------------------------------------------------------------
    // Fan
    // -------------------------------------------------------------------------

    /// Probes the fan sensors. Same availability and history rules as thermal.
    pub fn update_fan(&self) -> FanSample {
        let sample = read_fan(&self.settings.sys_root, &self.settings.proc_root);
        let previous = self.fan.replace(sample);
        if previous.available != sample.available {
            debug!("Fan sensor availability changed to {}", sample.available);
        }

        if sample.available {
            self.fan.history.record(sample.speed_rpm);
        }
        sample
    }

    pub fn fan_now(&self) -> FanSample {
        self.fan.load()
    }

    pub fn fan_available(&self) -> bool {
        self.fan.load().available
    }

    pub fn fan_history_snapshot(&self) -> Vec<u32> {
        self.fan.history.snapshot()
    }

    pub fn set_fan_history_paused(&self, paused: bool) {
        self.fan.history.set_paused(paused);
    }

    // -------------------------------------------------------------------------
    // Network
    // -------------------------------------------------------------------------

    /// Re-reads the interface table. Returns whether new data was applied.
    pub fn refresh_network_counters(&self) -> bool {
        let applied = self.network.refresh(&self.settings.proc_root);
        if applied {
            self.stats.record_network_refresh();
        }
        applied
    }

    pub fn is_network_data_ready(&self) -> bool {
        self.network.is_ready()
    }

    pub fn rx_counters(&self) -> BTreeMap<String, RxCounters> {
        self.network.rx_counters()
    }

    pub fn tx_counters(&self) -> BTreeMap<String, TxCounters> {
        self.network.tx_counters()
    }

    pub fn network_rates(&self) -> BTreeMap<String, InterfaceRate> {
        self.network.rates()
    }

    /// IPv4 addresses per interface, queried from the kernel on each call.
    pub fn interface_addresses(&self) -> BTreeMap<String, Vec<Ipv4Addr>> {
        interface_addresses()
    }

    // -------------------------------------------------------------------------
    // Self-observability
    // -------------------------------------------------------------------------

    pub fn stats(&self) -> SamplerStatsSnapshot {
        self.stats.snapshot()
    }
}
