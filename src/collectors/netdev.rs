//! Network interface statistics collector.
//!
//! This module parses `/proc/net/dev` into per-interface RX and TX counter
//! maps and keeps the last parse in [`NetworkCounterCache`]. Each refresh
//! replaces the maps wholesale, so an interface missing from the latest parse
//! is gone, not stale.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::error;
use crate::rate::counter_rate;

/// Receive-side counters, in kernel column order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxCounters {
    pub bytes: u64,
    pub packets: u64,
    pub errs: u64,
    pub drop: u64,
    pub fifo: u64,
    pub frame: u64,
    pub compressed: u64,
    pub multicast: u64,
}

/// Transmit-side counters, in kernel column order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxCounters {
    pub bytes: u64,
    pub packets: u64,
    pub errs: u64,
    pub drop: u64,
    pub fifo: u64,
    pub colls: u64,
    pub carrier: u64,
    pub compressed: u64,
}

/// Byte throughput of one interface between the last two refreshes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InterfaceRate {
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

/// One parse of the device table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetDevTable {
    pub rx: BTreeMap<String, RxCounters>,
    pub tx: BTreeMap<String, TxCounters>,
}

const HEADER_LINES: usize = 2;
const FIELDS_PER_LINE: usize = 16;

/// Parses `/proc/net/dev` content.
///
/// Lines without a `:`, with fewer than 16 values, or with a non-numeric
/// value are discarded.
pub fn parse_net_dev(content: &str) -> NetDevTable {
    let mut table = NetDevTable::default();

    for line in content.lines().skip(HEADER_LINES) {
        let Some((name, stats)) = line.split_once(':') else {
            continue;
        };
        let interface = name.trim();
        if interface.is_empty() {
            continue;
        }

        let values: Option<Vec<u64>> = stats
            .split_whitespace()
            .map(|v| v.parse::<u64>().ok())
            .collect();
        let values = match values {
            Some(v) if v.len() >= FIELDS_PER_LINE => v,
            _ => {
                debug!("Discarding malformed net/dev line for '{}'", interface);
                continue;
            }
        };

        table.rx.insert(
            interface.to_string(),
            RxCounters {
                bytes: values[0],
                packets: values[1],
                errs: values[2],
                drop: values[3],
                fifo: values[4],
                frame: values[5],
                compressed: values[6],
                multicast: values[7],
            },
        );
        table.tx.insert(
            interface.to_string(),
            TxCounters {
                bytes: values[8],
                packets: values[9],
                errs: values[10],
                drop: values[11],
                fifo: values[12],
                colls: values[13],
                carrier: values[14],
                compressed: values[15],
            },
        );
    }

    table
}

#[derive(Default)]
struct NetState {
    table: NetDevTable,
    rates: BTreeMap<String, InterfaceRate>,
    ready: bool,
    last_refresh: Option<Instant>,
}

/// Last parsed network counters, swapped in atomically on each refresh.
#[derive(Default)]
pub struct NetworkCounterCache {
    state: RwLock<NetState>,
}

impl NetworkCounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads `<proc_root>/net/dev`. The file is read and parsed without
    /// holding the lock. When it is unreadable the previous maps and
    /// readiness are kept. Returns whether new data was applied.
    #[instrument(skip(self))]
    pub fn refresh(&self, proc_root: &Path) -> bool {
        let path = proc_root.join("net").join("dev");
        match error::read_to_string(&path) {
            Ok(content) => {
                self.apply(parse_net_dev(&content), Instant::now());
                true
            }
            Err(e) => {
                debug!("Network counters unavailable: {}", e);
                false
            }
        }
    }

    /// Replaces both maps with `table` under one write lock and marks the
    /// cache ready. Rates are derived against the replaced maps.
    pub fn apply(&self, table: NetDevTable, now: Instant) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let mut rates = BTreeMap::new();
        if let Some(prev_time) = state.last_refresh {
            let elapsed = now.saturating_duration_since(prev_time).as_secs_f64();
            for (name, rx) in &table.rx {
                let (Some(prev_rx), Some(prev_tx), Some(tx)) = (
                    state.table.rx.get(name),
                    state.table.tx.get(name),
                    table.tx.get(name),
                ) else {
                    continue;
                };
                rates.insert(
                    name.clone(),
                    InterfaceRate {
                        rx_bytes_per_sec: counter_rate(prev_rx.bytes, rx.bytes, elapsed),
                        tx_bytes_per_sec: counter_rate(prev_tx.bytes, tx.bytes, elapsed),
                    },
                );
            }
        }

        state.table = table;
        state.rates = rates;
        state.ready = true;
        state.last_refresh = Some(now);
    }

    /// False until the first successful parse, so "no data yet" is never
    /// mistaken for "zero traffic".
    pub fn is_ready(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).ready
    }

    pub fn rx_counters(&self) -> BTreeMap<String, RxCounters> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .table
            .rx
            .clone()
    }

    pub fn tx_counters(&self) -> BTreeMap<String, TxCounters> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .table
            .tx
            .clone()
    }

    /// Per-interface byte rates; empty until two refreshes have happened.
    pub fn rates(&self) -> BTreeMap<String, InterfaceRate> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rates
            .clone()
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .table
            .rx
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    const NET_DEV: &str = "Inter-|   Receive                                                |  Transmit\n \
face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
lo: 1000 10 0 0 0 0 0 0 1000 10 0 0 0 0 0 0\n  \
eth0: 123456 789 1 2 3 4 5 6 654321 987 7 8 9 10 11 12\n";

    fn write_net_dev(root: &Path, content: &str) {
        std::fs::create_dir_all(root.join("net")).expect("mkdir net");
        std::fs::write(root.join("net").join("dev"), content).expect("write net/dev");
    }

    // -------------------------------------------------------------------------
    // parse_net_dev
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_net_dev_fields_match_input() {
        let table = parse_net_dev(NET_DEV);
        assert_eq!(table.rx.len(), 2);

        let rx = table.rx["eth0"];
        assert_eq!(
            rx,
            RxCounters {
                bytes: 123456,
                packets: 789,
                errs: 1,
                drop: 2,
                fifo: 3,
                frame: 4,
                compressed: 5,
                multicast: 6,
            }
        );
        let tx = table.tx["eth0"];
        assert_eq!(
            tx,
            TxCounters {
                bytes: 654321,
                packets: 987,
                errs: 7,
                drop: 8,
                fifo: 9,
                colls: 10,
                carrier: 11,
                compressed: 12,
            }
        );
        assert_eq!(parse_net_dev(NET_DEV), table);
    }

    #[test]
    fn test_parse_net_dev_discards_short_and_garbage_lines() {
        let content = "h1\nh2\n  short: 1 2 3\n  bad: 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 x\nnocolon 1 2\n  ok: 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16\n";
        let table = parse_net_dev(content);
        assert_eq!(table.rx.keys().collect::<Vec<_>>(), vec!["ok"]);
        assert_eq!(table.tx["ok"].compressed, 16);
    }

    #[test]
    fn test_parse_net_dev_headers_only() {
        let content = "Inter-| Receive | Transmit\n face |bytes packets|bytes packets\n";
        assert_eq!(parse_net_dev(content), NetDevTable::default());
    }

    // -------------------------------------------------------------------------
    // NetworkCounterCache
    // -------------------------------------------------------------------------

    #[test]
    fn test_cache_not_ready_before_refresh() {
        let cache = NetworkCounterCache::new();
        assert!(!cache.is_ready());
        assert!(cache.rx_counters().is_empty());
    }

    #[test]
    fn test_cache_missing_file_stays_not_ready() {
        let dir = tempdir().expect("Failed to create temp dir");
        let cache = NetworkCounterCache::new();
        assert!(!cache.refresh(dir.path()));
        assert!(!cache.is_ready());
    }

    #[test]
    fn test_cache_refresh_from_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        write_net_dev(dir.path(), NET_DEV);
        let cache = NetworkCounterCache::new();
        assert!(cache.refresh(dir.path()));
        assert!(cache.is_ready());
        assert_eq!(cache.interfaces(), vec!["eth0".to_string(), "lo".to_string()]);
        assert_eq!(cache.tx_counters()["lo"].bytes, 1000);
    }

    #[test]
    fn test_cache_replaces_not_merges() {
        let cache = NetworkCounterCache::new();
        let now = Instant::now();
        cache.apply(parse_net_dev(NET_DEV), now);

        let unplugged = "h1\nh2\n    lo: 2000 20 0 0 0 0 0 0 2000 20 0 0 0 0 0 0\n";
        cache.apply(parse_net_dev(unplugged), now + Duration::from_secs(1));

        let rx = cache.rx_counters();
        assert!(rx.get("eth0").is_none());
        assert_eq!(rx["lo"].bytes, 2000);
        assert!(cache.tx_counters().get("eth0").is_none());
    }

    #[test]
    fn test_cache_rates() {
        let cache = NetworkCounterCache::new();
        let now = Instant::now();
        cache.apply(parse_net_dev(NET_DEV), now);
        assert!(cache.rates().is_empty());

        let later = "h1\nh2\n    lo: 3000 20 0 0 0 0 0 0 1500 20 0 0 0 0 0 0\n";
        cache.apply(parse_net_dev(later), now + Duration::from_secs(2));
        let rates = cache.rates();
        assert_eq!(rates["lo"].rx_bytes_per_sec, 1000.0);
        assert_eq!(rates["lo"].tx_bytes_per_sec, 250.0);
        assert!(rates.get("eth0").is_none());
    }

    #[test]
    fn test_read_host_netdev() {
        // Every Linux host has a net/dev table with at least loopback
        let cache = NetworkCounterCache::new();
        if cache.refresh(Path::new("/proc")) {
            assert!(cache.is_ready());
        }
    }
}
