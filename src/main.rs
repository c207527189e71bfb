//! sysmon-engine - version 0.1.0
//!
//! Headless driver for the sampling engine with tracing logging.
//! `run` samples until interrupted and logs a periodic summary; `snapshot`
//! prints one report and exits.

use anyhow::{anyhow, Context};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};

use sysmon_engine::cli::{Args, Commands, LogLevel};
use sysmon_engine::config::{resolve_config, show_config, validate_effective_config, Config};
use sysmon_engine::format::{format_bytes, network_progress};
use sysmon_engine::monitor::{Monitor, MonitorSettings, ProcessRow};
use sysmon_engine::sampler::{sample_once, spawn_sampler};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let level = config.log_level();
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args).map_err(|e| anyhow!("{}", e))?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// One-line summary of everything the monitor currently holds.
fn summary_line(monitor: &Monitor) -> String {
    let mem = monitor.memory_snapshot();
    let thermal = monitor.thermal_now();
    let fan = monitor.fan_now();
    let counts = monitor.process_counts();
    let (rx_rate, tx_rate) = monitor
        .network_rates()
        .values()
        .fold((0.0, 0.0), |(rx, tx), r| {
            (rx + r.rx_bytes_per_sec, tx + r.tx_bytes_per_sec)
        });

    let temp = if thermal.available {
        format!("{:.1}°C", thermal.celsius)
    } else {
        "n/a".to_string()
    };
    let fan = if fan.available {
        format!("{} rpm", fan.speed_rpm)
    } else {
        "n/a".to_string()
    };

    format!(
        "cpu {:.1}% | ram {} / {} ({:.1}%) | swap {} / {} | disk {} / {} | temp {} | fan {} | procs {} ({} running) | net rx {}/s tx {}/s",
        monitor.cpu_usage_now(),
        format_bytes(mem.used_ram),
        format_bytes(mem.total_ram),
        mem.ram_percent(),
        format_bytes(mem.used_swap),
        format_bytes(mem.total_swap),
        format_bytes(mem.used_disk),
        format_bytes(mem.total_disk),
        temp,
        fan,
        counts.total,
        counts.running,
        format_bytes(rx_rate as u64),
        format_bytes(tx_rate as u64),
    )
}

async fn report_loop(monitor: Arc<Monitor>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    // First tick fires immediately; skip it so the samplers have data
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("{}", summary_line(&monitor));
                let stats = monitor.stats();
                debug!(
                    "scan avg {:.2} ms over {} scans, {} vanished, {} malformed, {} cpu passes",
                    stats.scan_ms_avg,
                    stats.scan_count,
                    stats.vanished_processes,
                    stats.malformed_processes,
                    stats.process_cpu_refreshes
                );
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn command_run(config: Config) -> anyhow::Result<()> {
    let monitor = Arc::new(Monitor::from_config(&config));
    let settings = monitor.settings();
    info!(
        "Sampling {} and {} (disk {}), history capacity {}",
        settings.proc_root.display(),
        settings.sys_root.display(),
        settings.disk_path.display(),
        settings.history_capacity
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_sampler(Arc::clone(&monitor), &config.sampling, shutdown_rx.clone());
    let reporter = tokio::spawn(report_loop(
        Arc::clone(&monitor),
        Duration::from_secs(config.sampling.report_interval_secs),
        shutdown_rx,
    ));

    shutdown_signal().await;
    // Receivers only vanish once every task has already exited
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Sampler task ended abnormally: {}", e);
        }
    }
    reporter.await.context("Reporter task ended abnormally")?;

    info!("sysmon-engine stopped gracefully");
    Ok(())
}

fn top_rows(monitor: &Monitor, top: usize) -> Vec<ProcessRow> {
    let mut rows = monitor.process_rows();
    rows.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then(b.rss_bytes.cmp(&a.rss_bytes))
    });
    rows.truncate(top);
    rows
}

fn print_snapshot_json(monitor: &Monitor, rows: &[ProcessRow]) -> anyhow::Result<()> {
    let mem = monitor.memory_snapshot();
    let thermal = monitor.thermal_now();
    let fan = monitor.fan_now();
    let counts = monitor.process_counts();
    let kernel = monitor.kernel_process_counters();

    let tx_counters = monitor.tx_counters();
    let rates = monitor.network_rates();
    let addresses = monitor.interface_addresses();
    let interfaces: Vec<serde_json::Value> = monitor
        .rx_counters()
        .into_iter()
        .map(|(name, rx)| {
            let tx = tx_counters.get(&name).copied().unwrap_or_default();
            let rate = rates.get(&name).copied().unwrap_or_default();
            let ipv4: Vec<String> = addresses
                .get(&name)
                .map(|a| a.iter().map(|ip| ip.to_string()).collect())
                .unwrap_or_default();
            serde_json::json!({
                "name": name,
                "ipv4": ipv4,
                "rx_bytes": rx.bytes,
                "rx_packets": rx.packets,
                "rx_errs": rx.errs,
                "rx_drop": rx.drop,
                "tx_bytes": tx.bytes,
                "tx_packets": tx.packets,
                "tx_errs": tx.errs,
                "tx_drop": tx.drop,
                "rx_bytes_per_sec": rate.rx_bytes_per_sec,
                "tx_bytes_per_sec": rate.tx_bytes_per_sec,
            })
        })
        .collect();

    let processes: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            serde_json::json!({
                "pid": r.pid,
                "ppid": r.ppid,
                "name": r.name,
                "state": r.state.as_char().to_string(),
                "cpu_percent": r.cpu_percent,
                "memory_percent": r.memory_percent,
                "rss_bytes": r.rss_bytes,
            })
        })
        .collect();

    let report = serde_json::json!({
        "cpu_percent": monitor.cpu_usage_now(),
        "memory": {
            "total_ram": mem.total_ram,
            "available_ram": mem.available_ram,
            "used_ram": mem.used_ram,
            "total_swap": mem.total_swap,
            "used_swap": mem.used_swap,
            "total_disk": mem.total_disk,
            "used_disk": mem.used_disk,
        },
        "thermal": {
            "available": thermal.available,
            "celsius": thermal.celsius,
        },
        "fan": {
            "available": fan.available,
            "speed_rpm": fan.speed_rpm,
            "level_percent": fan.level_percent,
            "active": fan.active,
        },
        "process_counts": {
            "total": counts.total,
            "running": counts.running,
            "sleeping": counts.sleeping,
            "disk_sleep": counts.disk_sleep,
            "idle": counts.idle,
            "zombie": counts.zombie,
            "stopped": counts.stopped,
            "other": counts.other,
            "forks_since_boot": kernel.forks_total,
            "procs_blocked": kernel.blocked,
        },
        "network_ready": monitor.is_network_data_ready(),
        "interfaces": interfaces,
        "top_processes": processes,
        "sampler": monitor.stats(),
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_snapshot_text(monitor: &Monitor, rows: &[ProcessRow]) {
    println!("{}", summary_line(monitor));

    if monitor.is_network_data_ready() {
        println!();
        println!(
            "{:<16} {:>12} {:>12} {:>8}  {}",
            "INTERFACE", "RX", "TX", "RX SCALE", "IPV4"
        );
        let tx = monitor.tx_counters();
        let addresses = monitor.interface_addresses();
        for (name, rx) in monitor.rx_counters() {
            let tx_bytes = tx.get(&name).map_or(0, |t| t.bytes);
            let ipv4 = addresses.get(&name).map_or_else(String::new, |a| {
                a.iter().map(|ip| ip.to_string()).collect::<Vec<_>>().join(",")
            });
            println!(
                "{:<16} {:>12} {:>12} {:>7.1}%  {}",
                name,
                format_bytes(rx.bytes),
                format_bytes(tx_bytes),
                network_progress(rx.bytes) * 100.0,
                ipv4
            );
        }
    }

    println!();
    println!(
        "{:>7} {:<20} {:>5} {:>7} {:>7} {:>12}",
        "PID", "NAME", "STATE", "CPU%", "MEM%", "RSS"
    );
    for r in rows {
        println!(
            "{:>7} {:<20} {:>5} {:>7.1} {:>7.1} {:>12}",
            r.pid,
            r.name,
            r.state.as_char(),
            r.cpu_percent,
            r.memory_percent,
            format_bytes(r.rss_bytes)
        );
    }
}

async fn command_snapshot(
    config: Config,
    wait_ms: u64,
    top: usize,
    json: bool,
) -> anyhow::Result<()> {
    let mut settings = MonitorSettings::from_config(&config);
    let wait = Duration::from_millis(wait_ms);
    // The second pass must not be throttled away
    settings.process_cpu_throttle = settings.process_cpu_throttle.min(wait);
    let monitor = Arc::new(Monitor::new(settings));

    let m = Arc::clone(&monitor);
    tokio::task::spawn_blocking(move || sample_once(&m)).await?;
    tokio::time::sleep(wait).await;
    let m = Arc::clone(&monitor);
    tokio::task::spawn_blocking(move || sample_once(&m)).await?;

    let rows = top_rows(&monitor, top);
    if json {
        print_snapshot_json(&monitor, &rows)
    } else {
        print_snapshot_text(&monitor, &rows);
        Ok(())
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args).map_err(|e| anyhow!("{}", e))?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format).map_err(|e| anyhow!("{}", e));
    }

    let config = load_validated_config(&args)?;
    setup_logging(&config)?;

    match args.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting sysmon-engine");
            command_run(config).await
        }
        Commands::Snapshot { wait_ms, top, json } => {
            command_snapshot(config, wait_ms, top, json).await
        }
    }
}
