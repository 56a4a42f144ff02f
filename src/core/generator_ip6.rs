//! IPv6 rule-table generation
//!
//! The IPv6 side mirrors the IPv4 generator where the features exist for
//! IPv6 at all, and otherwise blocks: Tor has no IPv6 support, and an
//! anonymization tunnel without an IPv6 gateway must not leak member IPv6
//! traffic onto the default route. Link-local traffic always passes; local
//! network protocols (neighbor discovery and friends) depend on it.

use std::net::{IpAddr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv6Network};
use tracing::debug;

use crate::core::config::GeneratorConfig;
use crate::core::devices::{IpAddressFilter, VpnClientState};
use crate::core::generator::{
    FirewallTables, VPN_ROUTER_CHAIN, active_clients_sorted, sorted_v6,
};
use crate::core::rule::{ConnectionState, Rule};
use crate::core::table::Table;

/// fe80::/10, valid only on the local segment and never routed.
fn link_local() -> Ipv6Network {
    Ipv6Network::new(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10)
        .expect("fe80::/10 is a valid prefix")
}

/// fc00::/7, the unique-local block. The IPv6 counterpart of the RFC 1918
/// ranges for the INPUT policy.
fn unique_local() -> Ipv6Network {
    Ipv6Network::new(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7)
        .expect("fc00::/7 is a valid prefix")
}

pub struct TableGeneratorIp6 {
    config: GeneratorConfig,
}

impl TableGeneratorIp6 {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates the nat, mangle and filter tables for the IPv6 side.
    pub fn generate(
        &self,
        filter: &IpAddressFilter,
        clients: &[VpnClientState],
    ) -> FirewallTables {
        let clients = active_clients_sorted(clients);
        let mut tables = FirewallTables::new();
        self.nat_table(&mut tables.nat, filter, &clients);
        self.mangle_table(&mut tables.mangle, filter, &clients);
        self.filter_table(&mut tables.filter, filter, &clients);
        debug!(active_clients = clients.len(), "generated IPv6 tables");
        tables
    }

    fn nat_table(&self, nat: &mut Table, filter: &IpAddressFilter, clients: &[&VpnClientState]) {
        let cfg = &self.config;
        let ports = &cfg.ports;
        let lan = Rule::new().input_interface(&cfg.standard_interface);

        let pre = nat.chain("PREROUTING");
        if let Some(own_ip6) = cfg.own_ip6 {
            if cfg.dns_enabled {
                pre.rule(
                    lan.clone()
                        .destination(IpAddr::from(own_ip6))
                        .udp()
                        .destination_port(53)
                        .redirect_to(own_ip6, ports.local_dns),
                );
            }
            let own = Rule::new().destination(IpAddr::from(own_ip6)).tcp();
            pre.rule(own.clone().destination_port(80).redirect_to(own_ip6, ports.http));
            pre.rule(own.destination_port(443).redirect_to(own_ip6, ports.https));

            if let Some(network6) = cfg.network6 {
                pre.rule(
                    lan.clone()
                        .destination(IpNetwork::V6(network6))
                        .return_from_chain(),
                );
            }
            if cfg.dns_enabled {
                pre.rule(
                    lan.clone()
                        .udp()
                        .destination_port(53)
                        .redirect_to(own_ip6, ports.local_dns),
                );
            }
            for ip in sorted_v6(filter.enabled_devices_ips()) {
                pre.rule(
                    lan.clone()
                        .source(IpAddr::from(ip))
                        .tcp()
                        .destination_port(80)
                        .redirect_to(own_ip6, ports.proxy),
                );
            }
            if cfg.ssl_enabled {
                for ip in sorted_v6(filter.ssl_enabled_devices_ips()) {
                    pre.rule(
                        lan.clone()
                            .source(IpAddr::from(ip))
                            .tcp()
                            .destination_port(443)
                            .redirect_to(own_ip6, ports.proxy_https),
                    );
                }
            }
        }

        let post = nat.chain("POSTROUTING");
        if cfg.masquerade_enabled {
            post.rule(
                Rule::new()
                    .output_interface(&cfg.standard_interface)
                    .masquerade(),
            );
        }
        // Only tunnels that can actually carry IPv6 masquerade member traffic
        for client in clients {
            if client.gateway_ip6.is_none() {
                continue;
            }
            if let Some(ref tunnel) = client.virtual_interface {
                for ip in sorted_v6(&filter.devices_ips(&client.devices)) {
                    post.rule(
                        Rule::new()
                            .source(IpAddr::from(ip))
                            .output_interface(tunnel)
                            .masquerade(),
                    );
                }
            }
        }
    }

    fn mangle_table(
        &self,
        mangle: &mut Table,
        filter: &IpAddressFilter,
        clients: &[&VpnClientState],
    ) {
        let vpn = mangle.chain(VPN_ROUTER_CHAIN);
        for client in clients {
            if client.gateway_ip6.is_none() {
                continue;
            }
            let Some(route) = client.route else {
                continue;
            };
            for ip in sorted_v6(&filter.devices_ips(&client.devices)) {
                vpn.rule(Rule::new().source(IpAddr::from(ip)).mark(route));
            }
        }
        mangle.chain("PREROUTING").rule(
            Rule::new()
                .input_interface(&self.config.standard_interface)
                .jump(VPN_ROUTER_CHAIN),
        );
        mangle.chain("OUTPUT").rule(Rule::new().jump(VPN_ROUTER_CHAIN));
    }

    fn filter_table(
        &self,
        table: &mut Table,
        filter: &IpAddressFilter,
        clients: &[&VpnClientState],
    ) {
        let cfg = &self.config;

        let input = table.chain("INPUT");
        input.rule(
            Rule::new()
                .source(IpNetwork::V6(link_local()))
                .return_from_chain(),
        );
        input.rule(Rule::new().states([ConnectionState::Established]).accept());
        if let Some(network6) = cfg.network6 {
            input.rule(
                Rule::new()
                    .source(IpNetwork::V6(network6))
                    .states([ConnectionState::New])
                    .accept(),
            );
        }
        // Unique-local sources outside the configured prefix are still local
        input.rule(
            Rule::new()
                .source(IpNetwork::V6(unique_local()))
                .states([ConnectionState::New])
                .accept(),
        );
        input.rule(Rule::new().states([ConnectionState::New]).drop());

        let forward = table.chain("FORWARD");
        forward.rule(
            Rule::new()
                .source(IpNetwork::V6(link_local()))
                .return_from_chain(),
        );
        if cfg.ssl_enabled {
            for ip in sorted_v6(filter.ssl_enabled_devices_ips()) {
                forward.rule(
                    Rule::new()
                        .source(IpAddr::from(ip))
                        .udp()
                        .destination_port(443)
                        .reject(),
                );
            }
        }
        // Tor has no IPv6 support; reset instead of letting traffic bypass it
        for ip in sorted_v6(filter.tor_devices_ips()) {
            forward.rule(Rule::new().source(IpAddr::from(ip)).reject_with_tcp_reset());
        }
        // Members of tunnels without an IPv6 gateway must not leak IPv6 onto
        // the default route; gateway-equipped tunnels pass through
        for client in clients {
            if client.gateway_ip6.is_some() {
                continue;
            }
            for ip in sorted_v6(&filter.devices_ips(&client.devices)) {
                forward.rule(Rule::new().source(IpAddr::from(ip)).reject_with_tcp_reset());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::devices::VpnState;
    use std::net::Ipv4Addr;

    fn config() -> GeneratorConfig {
        let mut cfg = GeneratorConfig::new(
            Ipv4Addr::new(192, 168, 1, 2),
            "192.168.1.0/24".parse().unwrap(),
        );
        cfg.own_ip6 = Some("fd00::2".parse().unwrap());
        cfg.network6 = Some("fd00::/64".parse().unwrap());
        cfg
    }

    #[test]
    fn test_link_local_rule_leads_both_filter_chains() {
        let generator = TableGeneratorIp6::new(config());
        let tables = generator.generate(&IpAddressFilter::new(), &[]);
        for chain in ["INPUT", "FORWARD"] {
            let first = &tables.filter.get(chain).unwrap().rules()[0];
            assert_eq!(first.to_string(), "-s fe80::/10 -j RETURN");
        }
    }

    #[test]
    fn test_no_gateway_client_members_are_blocked() {
        let generator = TableGeneratorIp6::new(config());
        let filter = IpAddressFilter::new()
            .with_device("device:a", ["fd00::42".parse::<IpAddr>().unwrap()]);

        let mut blocked = VpnClientState::new(1, VpnState::Active);
        blocked.devices.insert("device:a".to_string());
        blocked.route = Some(5);

        let tables = generator.generate(&filter, &[blocked.clone()]);
        let forward = tables.filter.get("FORWARD").unwrap();
        assert!(
            forward
                .rules()
                .iter()
                .any(|r| r.to_string() == "-s fd00::42 -j REJECT --reject-with tcp-reset")
        );
        // And no routing mark is emitted without an IPv6 gateway
        assert!(tables.mangle.get(VPN_ROUTER_CHAIN).unwrap().is_empty());

        // With a gateway the same client passes and is marked instead
        let mut routed = blocked;
        routed.gateway_ip6 = Some("fd00:1::1".parse().unwrap());
        let tables = generator.generate(&filter, &[routed]);
        let forward = tables.filter.get("FORWARD").unwrap();
        assert!(
            !forward
                .rules()
                .iter()
                .any(|r| r.to_string().contains("fd00::42"))
        );
        assert!(!tables.mangle.get(VPN_ROUTER_CHAIN).unwrap().is_empty());
    }

    #[test]
    fn test_generation_is_pure() {
        let mut cfg = config();
        cfg.dns_enabled = true;
        cfg.ssl_enabled = true;
        let filter = IpAddressFilter::new()
            .with_enabled(["fd00::10".parse().unwrap(), "fd00::3".parse().unwrap()])
            .with_tor(["fd00::50".parse().unwrap()]);
        let generator = TableGeneratorIp6::new(cfg);
        assert_eq!(
            generator.generate(&filter, &[]),
            generator.generate(&filter, &[])
        );
    }
}
