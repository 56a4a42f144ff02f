//! Generator configuration
//!
//! One explicit [`GeneratorConfig`] is handed to a generator at construction
//! time; there is no setter-then-generate ordering to get wrong. The struct
//! is a plain value and can be captured alongside the device snapshot.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::validators::{validate_interface, validate_port};

/// Local service ports rules redirect to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicePorts {
    /// Management UI over HTTP
    pub http: u16,
    /// Management UI over HTTPS
    pub https: u16,
    /// Intercepting HTTP proxy
    pub proxy: u16,
    /// Intercepting HTTPS proxy
    pub proxy_https: u16,
    /// Local DNS resolver
    pub local_dns: u16,
    /// SOCKS entry point for Tor-routed traffic
    pub anon_socks: u16,
    /// Parental-control block page over HTTP
    pub parental_control_http: u16,
    /// Parental-control block page over HTTPS
    pub parental_control_https: u16,
    /// Inbound mobile-VPN server (UDP)
    pub mobile_vpn_server: u16,
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self {
            http: 3000,
            https: 3443,
            proxy: 3128,
            proxy_https: 3130,
            local_dns: 5300,
            anon_socks: 12345,
            parental_control_http: 3003,
            parental_control_https: 3004,
            mobile_vpn_server: 1194,
        }
    }
}

/// Configuration surface of the table generators.
///
/// The flags toggle whole rule groups: `dns_enabled` the DNS interception
/// rules, `ssl_enabled` HTTPS interception and the HTTP/3 block,
/// `masquerade_enabled` the POSTROUTING masquerade, and
/// `mobile_vpn_server_enabled` the public-UDP allowance in filter/INPUT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// LAN interface devices are attached to
    pub standard_interface: String,
    /// Virtual interface of the inbound mobile-VPN server
    pub mobile_vpn_interface: String,
    /// Address used as redirect target for local services
    pub own_ip: Ipv4Addr,
    /// IPv6 analog of `own_ip`; absent when the appliance has no global IPv6
    #[serde(default)]
    pub own_ip6: Option<Ipv6Addr>,
    /// Defines "local" vs "public" for the INPUT policy
    pub network: Ipv4Network,
    #[serde(default)]
    pub network6: Option<Ipv6Network>,
    /// Emergency address the management UI also answers on
    #[serde(default)]
    pub fallback_ip: Option<Ipv4Addr>,
    /// Gateway address inside the mobile-VPN subnet
    #[serde(default)]
    pub mobile_vpn_ip: Option<Ipv4Addr>,
    /// Target of parental-control block-page redirects
    #[serde(default)]
    pub parental_control_redirect_ip: Option<Ipv4Addr>,
    /// Source address the proxy process uses when relaying Tor connections
    #[serde(default)]
    pub anon_source_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub ports: ServicePorts,
    #[serde(default)]
    pub dns_enabled: bool,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(default)]
    pub masquerade_enabled: bool,
    #[serde(default)]
    pub mobile_vpn_server_enabled: bool,
}

impl GeneratorConfig {
    /// Minimal configuration for a gateway at `own_ip` inside `network`.
    /// All feature flags start off.
    pub fn new(own_ip: Ipv4Addr, network: Ipv4Network) -> Self {
        Self {
            standard_interface: "eth0".to_string(),
            mobile_vpn_interface: "tun33".to_string(),
            own_ip,
            own_ip6: None,
            network,
            network6: None,
            fallback_ip: None,
            mobile_vpn_ip: None,
            parental_control_redirect_ip: None,
            anon_source_ip: None,
            ports: ServicePorts::default(),
            dns_enabled: false,
            ssl_enabled: false,
            masquerade_enabled: false,
            mobile_vpn_server_enabled: false,
        }
    }

    /// Parses a captured configuration from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that end up verbatim inside rendered rule text:
    /// interface names against kernel naming constraints and every service
    /// port against the usable range.
    pub fn validate(&self) -> Result<()> {
        validate_interface(&self.standard_interface)?;
        validate_interface(&self.mobile_vpn_interface)?;
        let p = &self.ports;
        for port in [
            p.http,
            p.https,
            p.proxy,
            p.proxy_https,
            p.local_dns,
            p.anon_socks,
            p.parental_control_http,
            p.parental_control_https,
            p.mobile_vpn_server,
        ] {
            validate_port(port)?;
        }
        Ok(())
    }
}
