//! Device and VPN state consumed by the generators
//!
//! [`IpAddressFilter`] is a point-in-time snapshot of device-to-policy
//! assignments; the generators never query live state mid-pass. The snapshot
//! carries addresses of both IP families; each generator picks the family it
//! is responsible for.

use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

/// Per-category device address lists plus a device-id lookup.
///
/// The underlying lists keep whatever order the orchestrator captured them
/// in; generators impose a sorted order before emitting rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpAddressFilter {
    #[serde(default)]
    enabled: Vec<IpAddr>,
    #[serde(default)]
    disabled: Vec<IpAddr>,
    #[serde(default)]
    ssl_enabled: Vec<IpAddr>,
    #[serde(default)]
    tor: Vec<IpAddr>,
    #[serde(default)]
    mobile_vpn: Vec<IpAddr>,
    #[serde(default)]
    mobile_vpn_private_network_access: Vec<IpAddr>,
    /// Concrete addresses per device id, for resolving anonymization-VPN
    /// client membership.
    #[serde(default)]
    device_ips: HashMap<String, Vec<IpAddr>>,
}

impl IpAddressFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.enabled = ips.into_iter().collect();
        self
    }

    pub fn with_disabled(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.disabled = ips.into_iter().collect();
        self
    }

    pub fn with_ssl_enabled(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.ssl_enabled = ips.into_iter().collect();
        self
    }

    pub fn with_tor(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.tor = ips.into_iter().collect();
        self
    }

    pub fn with_mobile_vpn(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.mobile_vpn = ips.into_iter().collect();
        self
    }

    pub fn with_mobile_vpn_private_network_access(
        mut self,
        ips: impl IntoIterator<Item = IpAddr>,
    ) -> Self {
        self.mobile_vpn_private_network_access = ips.into_iter().collect();
        self
    }

    pub fn with_device(mut self, id: impl Into<String>, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.device_ips.insert(id.into(), ips.into_iter().collect());
        self
    }

    pub fn enabled_devices_ips(&self) -> &[IpAddr] {
        &self.enabled
    }

    pub fn disabled_devices_ips(&self) -> &[IpAddr] {
        &self.disabled
    }

    pub fn ssl_enabled_devices_ips(&self) -> &[IpAddr] {
        &self.ssl_enabled
    }

    pub fn tor_devices_ips(&self) -> &[IpAddr] {
        &self.tor
    }

    pub fn mobile_vpn_devices_ips(&self) -> &[IpAddr] {
        &self.mobile_vpn
    }

    pub fn mobile_vpn_devices_private_network_access_ips(&self) -> &[IpAddr] {
        &self.mobile_vpn_private_network_access
    }

    /// Resolves a set of device ids to their current addresses. Unknown ids
    /// resolve to nothing; a device that is offline simply contributes no
    /// addresses.
    pub fn devices_ips(&self, ids: &BTreeSet<String>) -> Vec<IpAddr> {
        ids.iter()
            .filter_map(|id| self.device_ips.get(id))
            .flatten()
            .copied()
            .collect()
    }
}

/// Lifecycle state of an anonymization-VPN tunnel
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum VpnState {
    /// Tunnel is up; the client is rendered into rules
    #[strum(serialize = "active")]
    Active,
    /// Tunnel is being torn down and brought back up
    #[strum(serialize = "pending-restart")]
    PendingRestart,
    /// Tunnel is down
    #[strum(serialize = "inactive")]
    Inactive,
}

/// Per-tunnel record for one anonymization-VPN client
///
/// `route` is the policy-routing mark steering member traffic into the
/// tunnel. A missing `gateway_ip6` means the tunnel cannot carry IPv6 and
/// member IPv6 traffic must be blocked instead of leaked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VpnClientState {
    pub id: u32,
    pub state: VpnState,
    #[serde(default)]
    pub virtual_interface: Option<String>,
    #[serde(default)]
    pub route: Option<u32>,
    #[serde(default)]
    pub devices: BTreeSet<String>,
    #[serde(default)]
    pub local_endpoint_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub gateway_ip6: Option<Ipv6Addr>,
}

impl VpnClientState {
    pub fn new(id: u32, state: VpnState) -> Self {
        Self {
            id,
            state,
            virtual_interface: None,
            route: None,
            devices: BTreeSet::new(),
            local_endpoint_ip: None,
            gateway_ip6: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == VpnState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_devices_ips_resolution() {
        let filter = IpAddressFilter::new()
            .with_device("device:a", [ip("192.168.1.10"), ip("fd00::10")])
            .with_device("device:b", [ip("192.168.1.11")]);

        let ids: BTreeSet<String> = ["device:a", "device:b", "device:gone"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let ips = filter.devices_ips(&ids);
        assert_eq!(ips.len(), 3);
        assert!(ips.contains(&ip("192.168.1.10")));
        assert!(ips.contains(&ip("fd00::10")));
        assert!(ips.contains(&ip("192.168.1.11")));
    }

    #[test]
    fn test_unknown_devices_resolve_to_nothing() {
        let filter = IpAddressFilter::new();
        let ids: BTreeSet<String> = [String::from("device:gone")].into_iter().collect();
        assert!(filter.devices_ips(&ids).is_empty());
    }

    #[test]
    fn test_snapshot_roundtrips_through_json() {
        let filter = IpAddressFilter::new()
            .with_enabled([ip("192.168.1.42")])
            .with_tor([ip("192.168.1.50")]);
        let json = serde_json::to_string(&filter).unwrap();
        let back: IpAddressFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back.enabled_devices_ips(), filter.enabled_devices_ips());
        assert_eq!(back.tor_devices_ips(), filter.tor_devices_ips());
    }

    #[test]
    fn test_vpn_client_state_defaults() {
        let client = VpnClientState::new(7, VpnState::Active);
        assert!(client.is_active());
        assert!(client.route.is_none());
        assert!(client.gateway_ip6.is_none());

        let inactive = VpnClientState::new(8, VpnState::Inactive);
        assert!(!inactive.is_active());
    }
}
