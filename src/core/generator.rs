//! Shared generator plumbing
//!
//! Both address-family generators produce a [`FirewallTables`] bundle and
//! share the snapshot-ordering helpers here. Device-IP lists arrive in
//! whatever order the orchestrator captured them; rule order must not depend
//! on that, so everything is sorted and deduplicated before emission.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::core::devices::VpnClientState;
use crate::core::table::Table;

/// The three tables one generation pass produces.
///
/// Generation is a pure function of its inputs: the same snapshot yields a
/// structurally equal bundle, so diffing against a previously applied set is
/// meaningful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallTables {
    pub nat: Table,
    pub mangle: Table,
    pub filter: Table,
}

impl FirewallTables {
    pub(crate) fn new() -> Self {
        Self {
            nat: Table::new("nat"),
            mangle: Table::new("mangle"),
            filter: Table::new("filter"),
        }
    }
}

impl Default for FirewallTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain the mangle OUTPUT/PREROUTING chains jump into for routing marks.
pub const VPN_ROUTER_CHAIN: &str = "vpn-router";

/// The RFC 1918 ranges plus the IPv4 link-local block. Sources inside these
/// count as local for the INPUT policy even when they are outside the
/// configured LAN prefix, like mobile-VPN clients in the tunnel subnet or
/// the emergency management address.
pub(crate) fn private_networks_v4() -> [Ipv4Network; 4] {
    [
        network_v4(Ipv4Addr::new(10, 0, 0, 0), 8),
        network_v4(Ipv4Addr::new(172, 16, 0, 0), 12),
        network_v4(Ipv4Addr::new(192, 168, 0, 0), 16),
        network_v4(Ipv4Addr::new(169, 254, 0, 0), 16),
    ]
}

fn network_v4(addr: Ipv4Addr, prefix: u8) -> Ipv4Network {
    Ipv4Network::new(addr, prefix).expect("prefix is within 0..=32")
}

/// IPv4 addresses of a mixed-family list, sorted and deduplicated.
pub(crate) fn sorted_v4(ips: &[IpAddr]) -> Vec<Ipv4Addr> {
    let mut out: Vec<Ipv4Addr> = ips
        .iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// IPv6 addresses of a mixed-family list, sorted and deduplicated.
pub(crate) fn sorted_v6(ips: &[IpAddr]) -> Vec<Ipv6Addr> {
    let mut out: Vec<Ipv6Addr> = ips
        .iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(_) => None,
            IpAddr::V6(v6) => Some(*v6),
        })
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// ACTIVE clients in ascending id order. Only these are rendered into rules.
pub(crate) fn active_clients_sorted(clients: &[VpnClientState]) -> Vec<&VpnClientState> {
    let mut active: Vec<&VpnClientState> = clients.iter().filter(|c| c.is_active()).collect();
    active.sort_by_key(|c| c.id);
    active
}
