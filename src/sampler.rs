//! Periodic sampling driver.
//!
//! Every metric family is refreshed by its own tokio task on its own cadence.
//! The kernel reads are blocking file I/O, so each tick hands the work to the
//! blocking pool and the async side only schedules. All tasks stop when the
//! shutdown channel flips to `true`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, instrument, warn};

use crate::config::SamplingConfig;
use crate::monitor::Monitor;

/// Shortest cadence any job is scheduled at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// One independently scheduled refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerJob {
    Cpu,
    Thermal,
    Fan,
    Memory,
    ProcessList,
    ProcessCpu,
    Network,
}

impl SamplerJob {
    pub const ALL: [SamplerJob; 7] = [
        SamplerJob::Cpu,
        SamplerJob::Thermal,
        SamplerJob::Fan,
        SamplerJob::Memory,
        SamplerJob::ProcessList,
        SamplerJob::ProcessCpu,
        SamplerJob::Network,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SamplerJob::Cpu => "cpu",
            SamplerJob::Thermal => "thermal",
            SamplerJob::Fan => "fan",
            SamplerJob::Memory => "memory",
            SamplerJob::ProcessList => "process_list",
            SamplerJob::ProcessCpu => "process_cpu",
            SamplerJob::Network => "network",
        }
    }

    /// Tick period of this job. Process CPU polls at a quarter of the
    /// tracker throttle and lets the tracker decide when a pass is due.
    pub fn period(self, sampling: &SamplingConfig, process_cpu_throttle: Duration) -> Duration {
        let period = match self {
            SamplerJob::Cpu => Duration::from_millis(sampling.cpu_interval_ms),
            SamplerJob::Thermal => Duration::from_millis(sampling.thermal_interval_ms),
            SamplerJob::Fan => Duration::from_millis(sampling.fan_interval_ms),
            SamplerJob::Memory => Duration::from_millis(sampling.memory_interval_ms),
            SamplerJob::ProcessList => Duration::from_millis(sampling.process_interval_ms),
            SamplerJob::ProcessCpu => process_cpu_throttle / 4,
            SamplerJob::Network => Duration::from_millis(sampling.network_interval_ms),
        };
        period.max(MIN_PERIOD)
    }

    /// Runs the refresh synchronously on the calling thread.
    pub fn run(self, monitor: &Monitor) {
        match self {
            SamplerJob::Cpu => {
                monitor.update_cpu();
            }
            SamplerJob::Thermal => {
                monitor.update_thermal();
            }
            SamplerJob::Fan => {
                monitor.update_fan();
            }
            SamplerJob::Memory => {
                monitor.refresh_memory();
            }
            SamplerJob::ProcessList => {
                monitor.refresh_process_list();
            }
            SamplerJob::ProcessCpu => {
                monitor.refresh_process_cpu_if_due();
            }
            SamplerJob::Network => {
                monitor.refresh_network_counters();
            }
        }
    }
}

/// Runs every job once, in declaration order.
pub fn sample_once(monitor: &Monitor) {
    for job in SamplerJob::ALL {
        job.run(monitor);
    }
}

/// Spawns one task per job. The returned handles finish after shutdown.
pub fn spawn_sampler(
    monitor: Arc<Monitor>,
    sampling: &SamplingConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let throttle = monitor.settings().process_cpu_throttle;
    SamplerJob::ALL
        .into_iter()
        .map(|job| {
            let period = job.period(sampling, throttle);
            debug!("Scheduling {} sampler every {:?}", job.name(), period);
            tokio::spawn(run_periodic(
                job,
                period,
                Arc::clone(&monitor),
                shutdown.clone(),
            ))
        })
        .collect()
}

#[instrument(skip(monitor, shutdown))]
async fn run_periodic(
    job: SamplerJob,
    period: Duration,
    monitor: Arc<Monitor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let start = Instant::now();
                let m = Arc::clone(&monitor);
                if let Err(e) = tokio::task::spawn_blocking(move || job.run(&m)).await {
                    error!("{} sampler task failed: {}", job.name(), e);
                    continue;
                }
                let elapsed = start.elapsed();
                if elapsed > period {
                    warn!(
                        "{} sampling took {:?}, longer than its {:?} cadence",
                        job.name(),
                        elapsed,
                        period
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("{} sampler stopped", job.name());
}
