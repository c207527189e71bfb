//! Process-related modules for stat parsing, scanning and CPU tracking.
//!
//! This module provides:
//! - `stat`: Robust `/proc/<pid>/stat` parsing
//! - `scanner`: Process discovery and per-process reads
//! - `cpu`: Platform tick constants and the per-PID CPU tracker

pub mod cpu;
pub mod scanner;
pub mod stat;

// Re-export commonly used types
pub use cpu::{ProcessCpuEntry, ProcessCpuTracker, RefreshOutcome, CLK_TCK, PAGE_SIZE};
pub use scanner::{
    collect_proc_entries, list_all_processes, read_process, read_process_name, ProcEntry,
    ProcessCounts, ProcessSnapshot,
};
pub use stat::{parse_stat_line, ProcessState, StatLine};
