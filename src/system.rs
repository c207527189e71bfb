//! System-wide counters from the /proc filesystem.
//!
//! This module reads the aggregate CPU line and process counters from
//! `/proc/stat`, RAM and swap totals from `/proc/meminfo`, and disk usage of a
//! mount point through `statvfs`.

use std::path::Path;
use tracing::debug;

use crate::error::{self, ReadError};
use crate::rate::memory_percent;

/// Cumulative CPU tick counters from the aggregate `cpu` line of /proc/stat.
///
/// Counters only grow; a single sample means nothing on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuSample {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuSample {
    /// Total CPU time over the eight non-guest fields, saturating at
    /// `u64::MAX`. Guest time is already included in user/nice by the kernel.
    pub fn total(&self) -> u64 {
        [
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(self.user, |acc, v| acc.saturating_add(*v))
    }

    /// Non-active time (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }
}

/// Parses the aggregate `cpu ` line out of /proc/stat content.
///
/// Per-core `cpuN` lines are ignored. Older kernels expose fewer than ten
/// columns; the missing trailing counters stay zero.
pub fn parse_cpu_aggregate(content: &str) -> Option<CpuSample> {
    let line = content.lines().find(|l| {
        let mut parts = l.split_whitespace();
        parts.next() == Some("cpu")
    })?;

    let mut values = [0u64; 10];
    let mut count = 0;
    for (slot, token) in values.iter_mut().zip(line.split_whitespace().skip(1)) {
        *slot = token.parse().ok()?;
        count += 1;
    }
    if count < 4 {
        return None;
    }

    Some(CpuSample {
        user: values[0],
        nice: values[1],
        system: values[2],
        idle: values[3],
        iowait: values[4],
        irq: values[5],
        softirq: values[6],
        steal: values[7],
        guest: values[8],
        guest_nice: values[9],
    })
}

fn try_read_cpu_aggregate(proc_root: &Path) -> Result<CpuSample, ReadError> {
    let path = proc_root.join("stat");
    let content = error::read_to_string(&path)?;
    parse_cpu_aggregate(&content).ok_or_else(|| ReadError::missing(&path, "aggregate cpu line"))
}

/// Reads the aggregate CPU counters. All-zero when /proc/stat is unreadable
/// or the aggregate line is absent or malformed.
pub fn read_cpu_aggregate(proc_root: &Path) -> CpuSample {
    try_read_cpu_aggregate(proc_root).unwrap_or_else(|e| {
        debug!("CPU aggregate unavailable: {}", e);
        CpuSample::default()
    })
}

/// Process counters the kernel itself keeps in /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelProcessCounters {
    /// Forks since boot (`processes`).
    pub forks_total: u64,
    /// Currently runnable (`procs_running`).
    pub running: u64,
    /// Blocked on I/O (`procs_blocked`).
    pub blocked: u64,
}

pub fn parse_kernel_process_counters(content: &str) -> KernelProcessCounters {
    let mut counters = KernelProcessCounters::default();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        match key {
            "processes" => counters.forks_total = value,
            "procs_running" => counters.running = value,
            "procs_blocked" => counters.blocked = value,
            _ => {}
        }
    }
    counters
}

pub fn read_kernel_process_counters(proc_root: &Path) -> KernelProcessCounters {
    match error::read_to_string(&proc_root.join("stat")) {
        Ok(content) => parse_kernel_process_counters(&content),
        Err(e) => {
            debug!("Kernel process counters unavailable: {}", e);
            KernelProcessCounters::default()
        }
    }
}

/// RAM and swap totals from /proc/meminfo, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeminfoTotals {
    pub total_ram: u64,
    pub available_ram: u64,
    pub total_swap: u64,
    pub free_swap: u64,
}

/// Parses `Key: value kB` lines. Kernels without `MemAvailable` fall back to
/// MemFree + Buffers + Cached.
pub fn parse_meminfo(content: &str) -> MeminfoTotals {
    let mut totals = MeminfoTotals::default();
    let mut available: Option<u64> = None;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        let Some(bytes) = kb.checked_mul(1024) else {
            debug!("meminfo {} out of range: {} kB", key.trim(), kb);
            continue;
        };

        match key.trim() {
            "MemTotal" => totals.total_ram = bytes,
            "MemAvailable" => available = Some(bytes),
            "MemFree" => free = bytes,
            "Buffers" => buffers = bytes,
            "Cached" => cached = bytes,
            "SwapTotal" => totals.total_swap = bytes,
            "SwapFree" => totals.free_swap = bytes,
            _ => {}
        }
    }

    let reclaimable = free.saturating_add(buffers).saturating_add(cached);
    totals.available_ram = available.unwrap_or(reclaimable);
    totals
}

pub fn read_meminfo(proc_root: &Path) -> MeminfoTotals {
    match error::read_to_string(&proc_root.join("meminfo")) {
        Ok(content) => parse_meminfo(&content),
        Err(e) => {
            debug!("meminfo unavailable: {}", e);
            MeminfoTotals::default()
        }
    }
}

/// Disk usage of one filesystem, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
}

impl DiskUsage {
    /// Builds usage from raw statvfs fields. "Used" counts blocks not
    /// available to unprivileged users, so reserved blocks show as used.
    pub fn from_statvfs(blocks: u64, blocks_available: u64, fragment_size: u64) -> Self {
        Self {
            total: blocks.saturating_mul(fragment_size),
            used: blocks
                .saturating_sub(blocks_available)
                .saturating_mul(fragment_size),
        }
    }
}

fn try_read_disk_usage(path: &Path) -> Result<DiskUsage, ReadError> {
    use std::ffi::CString;
    use std::mem;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| ReadError::malformed(path, format!("invalid path: {}", e)))?;

    // SAFETY: statvfs is plain old data, valid when zeroed, and the path is
    // a NUL-terminated string that outlives the call.
    unsafe {
        let mut stat: libc::statvfs = mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
            return Err(ReadError::io(path, std::io::Error::last_os_error()));
        }
        Ok(DiskUsage::from_statvfs(
            stat.f_blocks as u64,
            stat.f_bavail as u64,
            stat.f_frsize as u64,
        ))
    }
}

/// Disk usage of the filesystem holding `path`; zero when statvfs fails.
pub fn read_disk_usage(path: &Path) -> DiskUsage {
    try_read_disk_usage(path).unwrap_or_else(|e| {
        debug!("Disk usage unavailable: {}", e);
        DiskUsage::default()
    })
}

/// Point-in-time memory, swap and disk usage. Recomputed fully on each call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub total_ram: u64,
    pub available_ram: u64,
    pub used_ram: u64,
    pub total_swap: u64,
    pub used_swap: u64,
    pub total_disk: u64,
    pub used_disk: u64,
}

impl MemorySnapshot {
    /// Combines meminfo totals and disk usage. Used RAM is total minus
    /// available (reclaimable cache is not "used").
    pub fn from_parts(mem: MeminfoTotals, disk: DiskUsage) -> Self {
        Self {
            total_ram: mem.total_ram,
            available_ram: mem.available_ram,
            used_ram: mem.total_ram.saturating_sub(mem.available_ram),
            total_swap: mem.total_swap,
            used_swap: mem.total_swap.saturating_sub(mem.free_swap),
            total_disk: disk.total,
            used_disk: disk.used,
        }
    }

    pub fn ram_percent(&self) -> f32 {
        memory_percent(self.used_ram, self.total_ram)
    }

    pub fn swap_percent(&self) -> f32 {
        memory_percent(self.used_swap, self.total_swap)
    }

    pub fn disk_percent(&self) -> f32 {
        memory_percent(self.used_disk, self.total_disk)
    }
}

pub fn read_memory_snapshot(proc_root: &Path, disk_path: &Path) -> MemorySnapshot {
    MemorySnapshot::from_parts(read_meminfo(proc_root), read_disk_usage(disk_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PROC_STAT: &str = "cpu  4705 356 584 3699 23 0 12 7 3 1\n\
cpu0 1393 280 290 1848 23 0 8 0 0 0\n\
cpu1 3312 76 294 1851 0 0 4 7 3 1\n\
intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]\n\
ctxt 1990473\n\
btime 1062191376\n\
processes 2915\n\
procs_running 3\n\
procs_blocked 1\n";

    // -------------------------------------------------------------------------
    // CPU aggregate
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_cpu_aggregate() {
        let s = parse_cpu_aggregate(PROC_STAT).expect("aggregate line");
        assert_eq!(s.user, 4705);
        assert_eq!(s.nice, 356);
        assert_eq!(s.system, 584);
        assert_eq!(s.idle, 3699);
        assert_eq!(s.iowait, 23);
        assert_eq!(s.irq, 0);
        assert_eq!(s.softirq, 12);
        assert_eq!(s.steal, 7);
        assert_eq!(s.guest, 3);
        assert_eq!(s.guest_nice, 1);
        assert_eq!(s.total(), 4705 + 356 + 584 + 3699 + 23 + 12 + 7);
        assert_eq!(s.idle_total(), 3699 + 23);
    }

    #[test]
    fn test_parse_cpu_aggregate_ignores_per_core_lines() {
        let content = "cpu0 1 2 3 4 5 6 7 8 9 10\ncpu1 1 2 3 4 5 6 7 8 9 10\n";
        assert!(parse_cpu_aggregate(content).is_none());
    }

    #[test]
    fn test_parse_cpu_aggregate_short_line() {
        let s = parse_cpu_aggregate("cpu  10 20 30 40\n").expect("four columns");
        assert_eq!(s.idle, 40);
        assert_eq!(s.steal, 0);
        assert!(parse_cpu_aggregate("cpu  10 20\n").is_none());
    }

    #[test]
    fn test_parse_cpu_aggregate_non_numeric() {
        assert!(parse_cpu_aggregate("cpu  10 x 30 40 50\n").is_none());
    }

    #[test]
    fn test_read_cpu_aggregate_missing_file_is_zero() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert_eq!(read_cpu_aggregate(dir.path()), CpuSample::default());
    }

    #[test]
    fn test_read_cpu_aggregate_from_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("stat"), PROC_STAT).expect("write stat");
        assert_eq!(read_cpu_aggregate(dir.path()).user, 4705);
    }

    #[test]
    fn test_parse_kernel_process_counters() {
        let c = parse_kernel_process_counters(PROC_STAT);
        assert_eq!(c.forks_total, 2915);
        assert_eq!(c.running, 3);
        assert_eq!(c.blocked, 1);
    }

    // -------------------------------------------------------------------------
    // meminfo / disk
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:       16000000 kB\n\
MemFree:         1000000 kB\n\
MemAvailable:    6000000 kB\n\
Buffers:          200000 kB\n\
Cached:          4000000 kB\n\
SwapTotal:       2000000 kB\n\
SwapFree:        1500000 kB\n";
        let m = parse_meminfo(content);
        assert_eq!(m.total_ram, 16_000_000 * 1024);
        assert_eq!(m.available_ram, 6_000_000 * 1024);
        assert_eq!(m.total_swap, 2_000_000 * 1024);
        assert_eq!(m.free_swap, 1_500_000 * 1024);

        let snap = MemorySnapshot::from_parts(m, DiskUsage::default());
        assert_eq!(snap.used_ram, 10_000_000 * 1024);
        assert_eq!(snap.used_swap, 500_000 * 1024);
        assert_eq!(snap.swap_percent(), 25.0);
    }

    #[test]
    fn test_parse_meminfo_without_memavailable() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\n";
        let m = parse_meminfo(content);
        assert_eq!(m.available_ram, 400 * 1024);
    }

    #[test]
    fn test_parse_meminfo_oversized_value_skipped() {
        let content = "MemTotal: 18446744073709551615 kB\nMemFree: 100 kB\nSwapTotal: 8 kB\n";
        let m = parse_meminfo(content);
        assert_eq!(m.total_ram, 0);
        assert_eq!(m.available_ram, 100 * 1024);
        assert_eq!(m.total_swap, 8 * 1024);
    }

    #[test]
    fn test_cpu_totals_saturate() {
        let s = parse_cpu_aggregate("cpu  18446744073709551615 5 0 10 3 0 0 0 0 0\n")
            .expect("aggregate line");
        assert_eq!(s.total(), u64::MAX);
        assert_eq!(s.idle_total(), 13);
        assert_eq!(crate::rate::cpu_usage_percent(&s, &s), 0.0);
    }

    #[test]
    fn test_disk_usage_from_statvfs() {
        let usage = DiskUsage::from_statvfs(1_000, 250, 4096);
        assert_eq!(usage.total, 1_000 * 4096);
        assert_eq!(usage.used, (1_000 - 250) * 4096);
    }

    #[test]
    fn test_disk_usage_available_exceeding_blocks() {
        let usage = DiskUsage::from_statvfs(10, 20, 512);
        assert_eq!(usage.used, 0);
    }

    #[test]
    fn test_read_disk_usage_root() {
        let usage = read_disk_usage(Path::new("/"));
        assert!(usage.used <= usage.total);
    }

    #[test]
    fn test_read_disk_usage_missing_path_is_zero() {
        let usage = read_disk_usage(Path::new("/definitely/not/a/mount/point"));
        assert_eq!(usage, DiskUsage::default());
    }

    #[test]
    fn test_memory_snapshot_zero_totals() {
        let snap = MemorySnapshot::default();
        assert_eq!(snap.ram_percent(), 0.0);
        assert_eq!(snap.disk_percent(), 0.0);
    }
}
