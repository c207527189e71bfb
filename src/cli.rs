//! CLI arguments and subcommands for sysmon-engine.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "sysmon-engine",
    about = "Linux system sampler with rolling CPU, thermal, fan, memory and network metrics",
    long_about = "Linux system sampler with rolling CPU, thermal, fan, memory and network metrics.\n\n\
                  Samples /proc and /sys on independent cadences, derives CPU percentages and \
                  network rates, and keeps bounded histories suitable for graphing.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides `log_level` from the config file; default info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Alternate procfs mount (default /proc)
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Alternate sysfs mount (default /sys)
    #[arg(long)]
    pub sys_root: Option<PathBuf>,

    /// Samples kept per history
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// Minimum seconds between per-process CPU recomputations
    #[arg(long)]
    pub process_cpu_throttle: Option<u64>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the sampler until interrupted, logging a periodic summary (default)
    Run,

    /// Take two CPU samples, print one report and exit
    Snapshot {
        /// Delay between the two samples in milliseconds
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,

        /// Number of processes to list, by CPU usage
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}
