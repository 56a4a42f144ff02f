//! Shared test utilities for core module tests
//!
//! Provides the canonical IPv4/IPv6 scenario used across the generator test
//! suites: a gateway at 192.168.1.2 with one device per policy category,
//! plus helpers for building VPN client records. Only compiled in test mode.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Once;

use crate::core::config::GeneratorConfig;
use crate::core::devices::{IpAddressFilter, VpnClientState, VpnState};

static TRACING_INIT: Once = Once::new();

/// Installs a tracing subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const GATEWAY_IP: &str = "192.168.1.2";
pub const FALLBACK_IP: &str = "169.254.94.109";
pub const PARENTAL_REDIRECT_IP: &str = "169.254.93.109";
pub const ANON_SOURCE_IP: &str = "169.254.7.53";
pub const MOBILE_VPN_IP: &str = "10.8.0.1";

pub const ENABLED_DEVICE: &str = "192.168.1.42";
pub const DISABLED_DEVICE: &str = "192.168.1.43";
pub const SSL_DEVICE: &str = "192.168.1.44";
pub const TOR_DEVICE: &str = "192.168.1.45";
pub const LOCAL_DEVICE: &str = "192.168.1.66";
pub const MOBILE_DEVICE: &str = "10.8.0.2";
pub const MOBILE_LOCAL_ACCESS_DEVICE: &str = "10.8.0.3";
pub const VPN_MEMBER_DEVICE: &str = "192.168.1.50";
pub const EXTERNAL_HOST: &str = "4.3.2.1";

pub const GATEWAY_IP6: &str = "fd00::2";
pub const ENABLED_DEVICE6: &str = "fd00::42";
pub const SSL_DEVICE6: &str = "fd00::44";
pub const TOR_DEVICE6: &str = "fd00::45";
pub const TOR_DEVICE6_LINK_LOCAL: &str = "fe80::45";
pub const VPN_MEMBER_DEVICE6: &str = "fd00::50";
pub const EXTERNAL_HOST6: &str = "2001:db8::1";

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn v4(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

/// Full-featured gateway configuration matching the scenario constants.
pub fn scenario_config() -> GeneratorConfig {
    let mut config = GeneratorConfig::new(v4(GATEWAY_IP), "192.168.1.0/24".parse().unwrap());
    config.own_ip6 = Some("fd00::2".parse().unwrap());
    config.network6 = Some("fd00::/64".parse().unwrap());
    config.fallback_ip = Some(v4(FALLBACK_IP));
    config.mobile_vpn_ip = Some(v4(MOBILE_VPN_IP));
    config.parental_control_redirect_ip = Some(v4(PARENTAL_REDIRECT_IP));
    config.anon_source_ip = Some(v4(ANON_SOURCE_IP));
    config.dns_enabled = true;
    config.ssl_enabled = true;
    config.masquerade_enabled = true;
    config.mobile_vpn_server_enabled = true;
    config
}

/// Snapshot with one device per category plus the VPN member device.
pub fn scenario_filter() -> IpAddressFilter {
    IpAddressFilter::new()
        .with_enabled([
            ip(ENABLED_DEVICE),
            ip(SSL_DEVICE),
            ip(VPN_MEMBER_DEVICE),
            ip(ENABLED_DEVICE6),
            ip(SSL_DEVICE6),
            ip(VPN_MEMBER_DEVICE6),
        ])
        .with_disabled([ip(DISABLED_DEVICE)])
        .with_ssl_enabled([ip(SSL_DEVICE), ip(SSL_DEVICE6)])
        .with_tor([ip(TOR_DEVICE), ip(TOR_DEVICE6), ip(TOR_DEVICE6_LINK_LOCAL)])
        .with_mobile_vpn([ip(MOBILE_DEVICE), ip(MOBILE_LOCAL_ACCESS_DEVICE)])
        .with_mobile_vpn_private_network_access([ip(MOBILE_LOCAL_ACCESS_DEVICE)])
        .with_device(
            "device:member",
            [ip(VPN_MEMBER_DEVICE), ip(VPN_MEMBER_DEVICE6)],
        )
}

/// ACTIVE client routing `device:member` through `tun0` with mark `route`.
pub fn active_client(route: u32) -> VpnClientState {
    let mut client = VpnClientState::new(1, VpnState::Active);
    client.route = Some(route);
    client.virtual_interface = Some("tun0".to_string());
    client.devices.insert("device:member".to_string());
    client.local_endpoint_ip = Some(v4("10.107.0.6"));
    client
}
