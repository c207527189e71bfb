//! Process scanning utilities for discovering and reading process entries from /proc.
//!
//! A full scan lists every all-digit directory under the proc root and reads
//! each one. Processes exit at any time, so a read failure for one PID is
//! counted and skipped; it never aborts the scan.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, trace};

use crate::error::{self, ReadError};
use crate::process::stat::{parse_stat_line, ProcessState};
use crate::stats::SamplerStats;

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// One process as seen by a single scan. Not carried across scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub state: ProcessState,
    pub ppid: u32,
    /// Virtual memory size in bytes.
    pub vsize: u64,
    /// Resident set size in pages.
    pub rss_pages: u64,
    pub utime: u64,
    pub stime: u64,
    /// Start time in ticks since boot; distinguishes a reused PID.
    pub start_time: u64,
}

impl ProcessSnapshot {
    /// utime + stime, saturating.
    pub fn total_ticks(&self) -> u64 {
        self.utime.saturating_add(self.stime)
    }

    pub fn rss_bytes(&self, page_size: u64) -> u64 {
        self.rss_pages.saturating_mul(page_size)
    }
}

/// Scans the proc root for directories whose whole name is ASCII digits.
pub fn collect_proc_entries(root: &Path) -> Vec<ProcEntry> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", root.display(), e);
            return out;
        }
    };

    for entry in entries.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let pid: u32 = match name.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        out.push(ProcEntry { pid, proc_path: p });
    }
    out
}

/// Reads the command name from `comm`, trailing newline stripped.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    let s = fs::read_to_string(proc_path.join("comm")).ok()?;
    let t = s.trim_end_matches('\n');
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Reads one process: name from `comm`, counters from `stat`.
///
/// When `comm` is gone but `stat` was read, the name embedded in the stat
/// line is used instead.
pub fn read_process(proc_path: &Path) -> Result<ProcessSnapshot, ReadError> {
    let stat_path = proc_path.join("stat");
    let content = error::read_to_string(&stat_path)?;
    let line = content.lines().next().unwrap_or_default();
    let stat = parse_stat_line(line).map_err(|reason| ReadError::malformed(&stat_path, reason))?;

    let name = read_process_name(proc_path).unwrap_or(stat.comm);

    Ok(ProcessSnapshot {
        pid: stat.pid,
        name,
        state: stat.state,
        ppid: stat.ppid,
        vsize: stat.vsize,
        rss_pages: stat.rss_pages,
        utime: stat.utime,
        stime: stat.stime,
        start_time: stat.start_time,
    })
}

/// Reads every process under the proc root in parallel.
///
/// Vanished and malformed processes are skipped and tallied in `stats`.
/// Output is sorted by PID.
pub fn list_all_processes(proc_root: &Path, stats: &SamplerStats) -> Vec<ProcessSnapshot> {
    let start = Instant::now();
    let entries = collect_proc_entries(proc_root);
    debug!(
        "Collected {} process entries from {}",
        entries.len(),
        proc_root.display()
    );

    let mut processes: Vec<ProcessSnapshot> = entries
        .par_iter()
        .filter_map(|entry| match read_process(&entry.proc_path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) if e.is_not_found() => {
                trace!("Process {} exited during scan", entry.pid);
                stats.record_vanished();
                None
            }
            Err(e) => {
                debug!("Skipping process {}: {}", entry.pid, e);
                stats.record_malformed();
                None
            }
        })
        .collect();

    processes.sort_unstable_by_key(|p| p.pid);
    stats.record_scan(start.elapsed());
    processes
}

/// Per-state tallies over one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCounts {
    pub total: usize,
    pub running: usize,
    pub sleeping: usize,
    pub disk_sleep: usize,
    pub idle: usize,
    pub zombie: usize,
    pub stopped: usize,
    pub other: usize,
}

impl ProcessCounts {
    pub fn from_snapshots(processes: &[ProcessSnapshot]) -> Self {
        let mut counts = ProcessCounts {
            total: processes.len(),
            ..Default::default()
        };
        for p in processes {
            match p.state {
                ProcessState::Running => counts.running += 1,
                ProcessState::Sleeping => counts.sleeping += 1,
                ProcessState::DiskSleep => counts.disk_sleep += 1,
                ProcessState::Idle => counts.idle += 1,
                ProcessState::Zombie => counts.zombie += 1,
                ProcessState::Stopped => counts.stopped += 1,
                ProcessState::Other(_) => counts.other += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Writes a fake /proc/<pid> directory with `comm` and `stat`.
    pub(crate) fn write_fake_process(
        root: &Path,
        pid: u32,
        comm: &str,
        state: char,
        utime: u64,
        stime: u64,
    ) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).expect("create pid dir");
        fs::write(dir.join("comm"), format!("{}\n", comm)).expect("write comm");
        let stat = format!(
            "{} ({}) {} 1 {} {} 0 -1 4194304 100 0 0 0 {} {} 0 0 20 0 1 0 777 8192000 300 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0",
            pid, comm, state, pid, pid, utime, stime
        );
        fs::write(dir.join("stat"), stat).expect("write stat");
    }

    // -------------------------------------------------------------------------
    // collect_proc_entries
    // -------------------------------------------------------------------------

    #[test]
    fn test_collect_only_numeric_dirs() {
        let dir = tempdir().expect("Failed to create temp dir");
        for name in ["1", "42", "self", "net", "12a", "007"] {
            fs::create_dir(dir.path().join(name)).expect("mkdir");
        }
        let mut pids: Vec<u32> = collect_proc_entries(dir.path())
            .into_iter()
            .map(|e| e.pid)
            .collect();
        pids.sort();
        assert_eq!(pids, vec![1, 7, 42]);
    }

    #[test]
    fn test_collect_missing_root() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert!(collect_proc_entries(&dir.path().join("nope")).is_empty());
    }

    // -------------------------------------------------------------------------
    // read_process / list_all_processes
    // -------------------------------------------------------------------------

    #[test]
    fn test_read_process_prefers_comm_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        write_fake_process(dir.path(), 10, "my app", 'R', 40, 2);
        let p = read_process(&dir.path().join("10")).expect("readable");
        assert_eq!(p.pid, 10);
        assert_eq!(p.name, "my app");
        assert_eq!(p.state, ProcessState::Running);
        assert_eq!(p.total_ticks(), 42);
        assert_eq!(p.vsize, 8192000);
        assert_eq!(p.rss_pages, 300);
        assert_eq!(p.rss_bytes(4096), 300 * 4096);
        assert_eq!(p.start_time, 777);
    }

    #[test]
    fn test_oversized_counters_saturate() {
        let dir = tempdir().expect("Failed to create temp dir");
        write_fake_process(dir.path(), 12, "hog", 'R', u64::MAX, 5);
        let p = read_process(&dir.path().join("12")).expect("readable");
        assert_eq!(p.utime, u64::MAX);
        assert_eq!(p.total_ticks(), u64::MAX);
        assert_eq!(p.rss_bytes(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_read_process_falls_back_to_stat_name() {
        let dir = tempdir().expect("Failed to create temp dir");
        write_fake_process(dir.path(), 11, "worker (x)", 'S', 1, 1);
        fs::remove_file(dir.path().join("11").join("comm")).expect("rm comm");
        let p = read_process(&dir.path().join("11")).expect("readable");
        assert_eq!(p.name, "worker (x)");
    }

    #[test]
    fn test_list_skips_vanished_and_malformed() {
        let dir = tempdir().expect("Failed to create temp dir");
        write_fake_process(dir.path(), 3, "c", 'S', 0, 0);
        write_fake_process(dir.path(), 1, "a", 'R', 0, 0);
        // Directory listed but stat gone: process exited between list and read
        fs::create_dir(dir.path().join("2")).expect("mkdir");
        // Garbage stat
        fs::create_dir(dir.path().join("4")).expect("mkdir");
        fs::write(dir.path().join("4").join("stat"), "4 (broken").expect("write");

        let stats = SamplerStats::default();
        let procs = list_all_processes(dir.path(), &stats);
        let pids: Vec<u32> = procs.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![1, 3]);

        let snap = stats.snapshot();
        assert_eq!(snap.vanished_processes, 1);
        assert_eq!(snap.malformed_processes, 1);
        assert_eq!(snap.scan_count, 1);
    }

    #[test]
    fn test_process_counts() {
        let dir = tempdir().expect("Failed to create temp dir");
        write_fake_process(dir.path(), 1, "a", 'R', 0, 0);
        write_fake_process(dir.path(), 2, "b", 'S', 0, 0);
        write_fake_process(dir.path(), 3, "c", 'D', 0, 0);
        write_fake_process(dir.path(), 4, "d", 'Z', 0, 0);
        write_fake_process(dir.path(), 5, "e", 't', 0, 0);
        write_fake_process(dir.path(), 6, "f", 'I', 0, 0);

        let procs = list_all_processes(dir.path(), &SamplerStats::default());
        let counts = ProcessCounts::from_snapshots(&procs);
        assert_eq!(counts.total, 6);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.sleeping, 1);
        assert_eq!(counts.disk_sleep, 1);
        assert_eq!(counts.zombie, 1);
        assert_eq!(counts.stopped, 1);
        assert_eq!(counts.idle, 1);
        assert_eq!(counts.other, 0);
    }
}
