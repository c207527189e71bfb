//! Collectors module for sensor and device metrics.
//!
//! This module contains collectors for network interface counters and
//! addresses, and for thermal and fan sensors exposed through /sys (and
//! /proc/acpi).

pub mod fan;
pub mod ifaddr;
pub mod netdev;
pub mod thermal;

pub use fan::{read_fan, FanSample};
pub use ifaddr::interface_addresses;
pub use netdev::{
    parse_net_dev, InterfaceRate, NetDevTable, NetworkCounterCache, RxCounters, TxCounters,
};
pub use thermal::{default_thermal_candidates, read_thermal, ThermalSample};
