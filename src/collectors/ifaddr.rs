//! IPv4 addresses assigned to network interfaces.
//!
//! Read on demand through `getifaddrs(3)`; addresses change rarely, so there
//! is no cache or sampler job behind this.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use nix::ifaddrs::getifaddrs;
use tracing::debug;

/// Groups `(interface, address)` entries by interface, keeping only IPv4.
///
/// Entries without an IPv4 address (IPv6, link-layer, none) are dropped, and
/// an interface with several addresses keeps them in kernel order.
pub fn group_ipv4_addresses<I>(entries: I) -> BTreeMap<String, Vec<Ipv4Addr>>
where
    I: IntoIterator<Item = (String, Option<Ipv4Addr>)>,
{
    let mut grouped: BTreeMap<String, Vec<Ipv4Addr>> = BTreeMap::new();
    for (name, addr) in entries {
        if let Some(addr) = addr {
            grouped.entry(name).or_default().push(addr);
        }
    }
    grouped
}

/// IPv4 addresses per interface name. Empty when the kernel query fails.
pub fn interface_addresses() -> BTreeMap<String, Vec<Ipv4Addr>> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("getifaddrs failed: {}", e);
            return BTreeMap::new();
        }
    };

    group_ipv4_addresses(addrs.map(|ifa| {
        let ipv4 = ifa
            .address
            .as_ref()
            .and_then(|a| a.as_sockaddr_in())
            .map(|sin| *SocketAddrV4::from(*sin).ip());
        (ifa.interface_name, ipv4)
    }))
}
