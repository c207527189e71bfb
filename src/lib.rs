//! sysmon-engine: sampling and derived-metrics engine for Linux system monitors
//!
//! This library reads cumulative kernel counters from `/proc` and sensor
//! files from `/sys`, turns pairs of samples into percentages and rates, and
//! keeps bounded histories that a UI or exporter can render at its own pace.
//!
//! # Features
//!
//! - **System CPU**: aggregate usage from `/proc/stat` deltas
//! - **Per-process CPU**: throttled, PID-reuse aware tick deltas
//! - **Memory, swap and disk**: point-in-time snapshots
//! - **Thermal and fan probes**: first readable sensor wins, availability re-checked every sample
//! - **Network counters**: full `/proc/net/dev` tables swapped in atomically
//! - **Rolling history**: fixed-capacity, pausable buffers per metric
//!
//! # Usage
//!
//! ```rust
//! use sysmon_engine::{Monitor, MonitorSettings};
//!
//! let monitor = Monitor::new(MonitorSettings::default());
//!
//! // The first CPU sample only establishes a baseline
//! assert!(monitor.update_cpu().is_none());
//! monitor.update_cpu();
//! let usage = monitor.cpu_usage_now();
//! assert!((0.0..=100.0).contains(&usage));
//!
//! monitor.refresh_network_counters();
//! for (iface, rx) in monitor.rx_counters() {
//!     println!("{}: {} bytes received", iface, rx.bytes);
//! }
//! ```
//!
//! Long-running hosts drive the monitor through [`sampler::spawn_sampler`],
//! which refreshes every metric family on its own tokio task.

pub mod cli;
pub mod collectors;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod monitor;
pub mod process;
pub mod rate;
pub mod sampler;
pub mod stats;
pub mod system;

// Re-export main types for convenience
pub use collectors::{FanSample, InterfaceRate, RxCounters, ThermalSample, TxCounters};
pub use config::Config;
pub use error::ReadError;
pub use history::{HistoryBuffer, MetricHistory, DEFAULT_HISTORY_CAPACITY};
pub use monitor::{Monitor, MonitorSettings, ProcessRow};
pub use process::{ProcessCounts, ProcessSnapshot, ProcessState};
pub use sampler::{sample_once, spawn_sampler, SamplerJob};
pub use stats::SamplerStatsSnapshot;
pub use system::{CpuSample, KernelProcessCounters, MemorySnapshot};
