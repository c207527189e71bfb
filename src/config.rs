//! Configuration management for sysmon-engine.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats. Configuration is
//! read once at startup; nothing is written back.

use clap::ValueEnum;
use crate::cli::{Args, ConfigFormat, LogLevel};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_SYS_ROOT: &str = "/sys";
pub const DEFAULT_DISK_PATH: &str = "/";

/// Per-metric sampling cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// CPU usage cadence in milliseconds (default: 1000)
    #[serde(default = "default_cpu_interval_ms", alias = "cpu-interval-ms")]
    pub cpu_interval_ms: u64,

    /// Thermal probe cadence in milliseconds (default: 1000)
    #[serde(default = "default_sensor_interval_ms", alias = "thermal-interval-ms")]
    pub thermal_interval_ms: u64,

    /// Fan probe cadence in milliseconds (default: 1000)
    #[serde(default = "default_sensor_interval_ms", alias = "fan-interval-ms")]
    pub fan_interval_ms: u64,

    /// Memory/swap/disk cadence in milliseconds (default: 2000)
    #[serde(default = "default_memory_interval_ms", alias = "memory-interval-ms")]
    pub memory_interval_ms: u64,

    /// Full process list cadence in milliseconds (default: 2000)
    #[serde(default = "default_process_interval_ms", alias = "process-interval-ms")]
    pub process_interval_ms: u64,

    /// Network table cadence in milliseconds (default: 1000)
    #[serde(default = "default_network_interval_ms", alias = "network-interval-ms")]
    pub network_interval_ms: u64,

    /// Summary log cadence of the headless driver in seconds (default: 10)
    #[serde(default = "default_report_interval_secs", alias = "report-interval-secs")]
    pub report_interval_secs: u64,
}

fn default_cpu_interval_ms() -> u64 {
    1000
}
fn default_sensor_interval_ms() -> u64 {
    1000
}
fn default_memory_interval_ms() -> u64 {
    2000
}
fn default_process_interval_ms() -> u64 {
    2000
}
fn default_network_interval_ms() -> u64 {
    1000
}
fn default_report_interval_secs() -> u64 {
    10
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            cpu_interval_ms: default_cpu_interval_ms(),
            thermal_interval_ms: default_sensor_interval_ms(),
            fan_interval_ms: default_sensor_interval_ms(),
            memory_interval_ms: default_memory_interval_ms(),
            process_interval_ms: default_process_interval_ms(),
            network_interval_ms: default_network_interval_ms(),
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

/// Rolling history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Samples kept per metric (default: 100)
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Per-process CPU tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCpuConfig {
    /// Minimum seconds between recomputations (default: 3)
    #[serde(default = "default_throttle_seconds", alias = "throttle-seconds")]
    pub throttle_seconds: u64,

    /// Drop cache entries unseen for this many passes; 0 never drops (default: 3)
    #[serde(default = "default_evict_after_passes", alias = "evict-after-passes")]
    pub evict_after_passes: u64,
}

fn default_throttle_seconds() -> u64 {
    3
}
fn default_evict_after_passes() -> u64 {
    3
}

impl Default for ProcessCpuConfig {
    fn default() -> Self {
        Self {
            throttle_seconds: default_throttle_seconds(),
            evict_after_passes: default_evict_after_passes(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Kernel interfaces
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    #[serde(alias = "sys-root")]
    pub sys_root: Option<PathBuf>,
    /// Mount point whose usage is reported as disk usage
    #[serde(alias = "disk-path")]
    pub disk_path: Option<PathBuf>,
    /// Ordered temperature files to probe instead of the built-in list
    #[serde(alias = "thermal-candidates")]
    pub thermal_candidates: Option<Vec<PathBuf>>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default, alias = "process-cpu")]
    pub process_cpu: ProcessCpuConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            sys_root: Some(PathBuf::from(DEFAULT_SYS_ROOT)),
            disk_path: Some(PathBuf::from(DEFAULT_DISK_PATH)),
            thermal_candidates: None,
            log_level: Some("info".into()),
            sampling: SamplingConfig::default(),
            history: HistoryConfig::default(),
            process_cpu: ProcessCpuConfig::default(),
        }
    }
}

impl Config {
    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn sys_root(&self) -> PathBuf {
        self.sys_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYS_ROOT))
    }

    pub fn disk_path(&self) -> PathBuf {
        self.disk_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DISK_PATH))
    }

    /// Effective log level; unknown names were rejected by validation.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(|s| LogLevel::from_str(s, true).ok())
            .unwrap_or(LogLevel::Info)
    }

    pub fn process_cpu_throttle(&self) -> Duration {
        Duration::from_secs(self.process_cpu.throttle_seconds)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let s = &cfg.sampling;
    let intervals = [
        ("cpu_interval_ms", s.cpu_interval_ms),
        ("thermal_interval_ms", s.thermal_interval_ms),
        ("fan_interval_ms", s.fan_interval_ms),
        ("memory_interval_ms", s.memory_interval_ms),
        ("process_interval_ms", s.process_interval_ms),
        ("network_interval_ms", s.network_interval_ms),
        ("report_interval_secs", s.report_interval_secs),
    ];
    for (name, value) in intervals {
        if value == 0 {
            return Err(format!("sampling.{} must be greater than 0", name).into());
        }
    }

    if cfg.history.capacity == 0 {
        return Err("history.capacity must be greater than 0".into());
    }

    if cfg.process_cpu.throttle_seconds == 0 {
        return Err("process_cpu.throttle_seconds must be greater than 0".into());
    }

    if let Some(level) = &cfg.log_level {
        if LogLevel::from_str(level, true).is_err() {
            return Err(format!("Invalid log_level: {}", level).into());
        }
    }

    if let Some(candidates) = &cfg.thermal_candidates {
        if candidates.is_empty() {
            return Err("thermal_candidates is set but empty".into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(proc_root) = &args.proc_root {
        config.proc_root = Some(proc_root.clone());
    }
    if let Some(sys_root) = &args.sys_root {
        config.sys_root = Some(sys_root.clone());
    }
    if let Some(capacity) = args.history_capacity {
        config.history.capacity = capacity;
    }
    if let Some(throttle) = args.process_cpu_throttle {
        config.process_cpu.throttle_seconds = throttle;
    }
    if let Some(level) = args.log_level {
        if let Some(value) = level.to_possible_value() {
            config.log_level = Some(value.get_name().to_string());
        }
    }

    Ok(config)
}

/// Loads a config file, picking the parser from the extension.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/sysmon-engine/config.yaml",
            "/etc/sysmon-engine/config.yml",
            "./sysmon-engine.yaml",
            "./sysmon-engine.yml",
            "./sysmon-engine.json",
            "./sysmon-engine.toml",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_default()
    };

    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
