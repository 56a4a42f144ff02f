//! IPv4 rule-table generation
//!
//! Given one snapshot of device-to-policy assignments and the active
//! anonymization-VPN tunnels, synthesizes the nat, mangle and filter tables
//! for the IPv4 side of the gateway. The pass is a pure function: no state
//! survives between calls and identical inputs yield structurally equal
//! tables.
//!
//! Rule order within a chain is match priority, so specific device-category
//! rules are appended before the general ones they would otherwise shadow,
//! and device lists are sorted before emission to keep output reproducible.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use tracing::debug;

use crate::core::config::GeneratorConfig;
use crate::core::devices::{IpAddressFilter, VpnClientState};
use crate::core::generator::{
    FirewallTables, VPN_ROUTER_CHAIN, active_clients_sorted, private_networks_v4, sorted_v4,
};
use crate::core::rule::{ConnectionState, Rule};
use crate::core::table::Table;

pub struct TableGeneratorIp4 {
    config: GeneratorConfig,
}

impl TableGeneratorIp4 {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates the nat, mangle and filter tables for the given snapshot.
    ///
    /// Never fails for well-formed input: a VPN client without a route,
    /// tunnel interface or resolvable member addresses simply contributes no
    /// rules instead of aborting the pass.
    pub fn generate(
        &self,
        filter: &IpAddressFilter,
        clients: &[VpnClientState],
    ) -> FirewallTables {
        let clients = active_clients_sorted(clients);
        let mut tables = FirewallTables::new();
        self.nat_table(&mut tables.nat, filter, &clients);
        self.mangle_table(&mut tables.mangle, filter, &clients);
        self.filter_table(&mut tables.filter, filter);
        debug!(
            active_clients = clients.len(),
            enabled_devices = filter.enabled_devices_ips().len(),
            "generated IPv4 tables"
        );
        tables
    }

    fn nat_table(&self, nat: &mut Table, filter: &IpAddressFilter, clients: &[&VpnClientState]) {
        let cfg = &self.config;
        let ports = &cfg.ports;
        let lan = Rule::new().input_interface(&cfg.standard_interface);

        let pre = nat.chain("PREROUTING");

        // DNS queries aimed directly at the gateway
        if cfg.dns_enabled {
            pre.rule(
                lan.clone()
                    .destination(IpAddr::from(cfg.own_ip))
                    .udp()
                    .destination_port(53)
                    .redirect_to(cfg.own_ip, ports.local_dns),
            );
        }

        // Parental-control block page
        if let Some(pc_ip) = cfg.parental_control_redirect_ip {
            let to_pc = Rule::new().destination(IpAddr::from(pc_ip)).tcp();
            pre.rule(
                to_pc
                    .clone()
                    .destination_port(80)
                    .redirect_to(pc_ip, ports.parental_control_http),
            );
            pre.rule(
                to_pc
                    .destination_port(443)
                    .redirect_to(pc_ip, ports.parental_control_https),
            );
        }

        // Settings access on the gateway's own address and the emergency
        // address, and via the mobile-VPN gateway for roaming devices
        let own = Rule::new().destination(IpAddr::from(cfg.own_ip)).tcp();
        pre.rule(own.clone().destination_port(80).redirect_to(cfg.own_ip, ports.http));
        pre.rule(own.destination_port(443).redirect_to(cfg.own_ip, ports.https));
        if let Some(fallback) = cfg.fallback_ip {
            let emergency = Rule::new().destination(IpAddr::from(fallback)).tcp();
            pre.rule(
                emergency
                    .clone()
                    .destination_port(80)
                    .redirect_to(fallback, ports.http),
            );
            pre.rule(emergency.destination_port(443).redirect_to(fallback, ports.https));
        }
        if let Some(vpn_ip) = cfg.mobile_vpn_ip {
            let gateway = Rule::new()
                .input_interface(&cfg.mobile_vpn_interface)
                .destination(IpAddr::from(vpn_ip))
                .tcp();
            pre.rule(gateway.clone().destination_port(80).redirect_to(vpn_ip, ports.http));
            pre.rule(gateway.destination_port(443).redirect_to(vpn_ip, ports.https));
        }

        // Traffic between LAN devices is never redirected
        pre.rule(
            lan.clone()
                .destination(IpNetwork::V4(cfg.network))
                .return_from_chain(),
        );

        // DNS interception for everything else. Disabled devices are
        // intentionally included here; see the redirect-for-disabled note in
        // DESIGN.md before changing this.
        if cfg.dns_enabled {
            pre.rule(
                lan.clone()
                    .udp()
                    .destination_port(53)
                    .redirect_to(cfg.own_ip, ports.local_dns),
            );
        }

        // HTTP interception per enabled device, HTTPS per ssl-enabled device
        for ip in sorted_v4(filter.enabled_devices_ips()) {
            pre.rule(
                lan.clone()
                    .source(IpAddr::from(ip))
                    .tcp()
                    .destination_port(80)
                    .redirect_to(cfg.own_ip, ports.proxy),
            );
        }
        if cfg.ssl_enabled {
            for ip in sorted_v4(filter.ssl_enabled_devices_ips()) {
                pre.rule(
                    lan.clone()
                        .source(IpAddr::from(ip))
                        .tcp()
                        .destination_port(443)
                        .redirect_to(cfg.own_ip, ports.proxy_https),
                );
            }
        }

        // Tor-routed devices: web traffic takes the proxy path, every other
        // TCP connection enters the SOCKS gate. Tor carries no UDP; that is
        // rejected in filter/FORWARD instead.
        for ip in sorted_v4(filter.tor_devices_ips()) {
            let device = Rule::new().source(IpAddr::from(ip)).tcp();
            pre.rule(device.clone().destination_port(80).redirect_to(cfg.own_ip, ports.proxy));
            if cfg.ssl_enabled {
                pre.rule(
                    device
                        .clone()
                        .destination_port(443)
                        .redirect_to(cfg.own_ip, ports.proxy_https),
                );
            }
            pre.rule(device.redirect_to(cfg.own_ip, ports.anon_socks));
        }

        // Mobile-VPN devices reach the proxy via the tunnel gateway address
        if let Some(vpn_ip) = cfg.mobile_vpn_ip {
            for ip in sorted_v4(filter.mobile_vpn_devices_ips()) {
                let device = Rule::new()
                    .input_interface(&cfg.mobile_vpn_interface)
                    .source(IpAddr::from(ip))
                    .tcp();
                pre.rule(device.clone().destination_port(80).redirect_to(vpn_ip, ports.proxy));
                if cfg.ssl_enabled {
                    pre.rule(
                        device
                            .destination_port(443)
                            .redirect_to(vpn_ip, ports.proxy_https),
                    );
                }
            }
        }

        // Anonymization-VPN members keep the standard proxy path for web
        // traffic; policy routing steers the rest into the tunnel.
        for client in clients {
            for ip in sorted_v4(&filter.devices_ips(&client.devices)) {
                let device = Rule::new().source(IpAddr::from(ip)).tcp();
                pre.rule(device.clone().destination_port(80).redirect_to(cfg.own_ip, ports.proxy));
                if cfg.ssl_enabled {
                    pre.rule(
                        device
                            .destination_port(443)
                            .redirect_to(cfg.own_ip, ports.proxy_https),
                    );
                }
            }
        }

        // The proxy relays Tor connections from a dedicated source address
        if let Some(anon_src) = cfg.anon_source_ip {
            nat.chain("OUTPUT").rule(
                Rule::new()
                    .source(IpAddr::from(anon_src))
                    .tcp()
                    .redirect_to(cfg.own_ip, ports.anon_socks),
            );
        }

        let post = nat.chain("POSTROUTING");
        if cfg.masquerade_enabled {
            post.rule(
                Rule::new()
                    .output_interface(&cfg.standard_interface)
                    .masquerade(),
            );
        }
        // Mobile-VPN devices always masquerade on egress, independent of the
        // global masquerade flag
        for ip in sorted_v4(filter.mobile_vpn_devices_ips()) {
            post.rule(
                Rule::new()
                    .source(IpAddr::from(ip))
                    .output_interface(&cfg.standard_interface)
                    .masquerade(),
            );
        }
        for client in clients {
            if let Some(ref tunnel) = client.virtual_interface {
                for ip in sorted_v4(&filter.devices_ips(&client.devices)) {
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
            // No route means no mark rules for this client; other clients
            // are unaffected.
            let Some(route) = client.route else {
                continue;
            };
            for ip in sorted_v4(&filter.devices_ips(&client.devices)) {
                vpn.rule(Rule::new().source(IpAddr::from(ip)).mark(route));
            }
            // Replies the local DNS sends on behalf of the tunnel must
            // re-enter it rather than take the default route
            if let Some(endpoint) = client.local_endpoint_ip {
                vpn.rule(Rule::new().source(IpAddr::from(endpoint)).mark(route));
            }
        }
        mangle.chain("PREROUTING").rule(
            Rule::new()
                .input_interface(&self.config.standard_interface)
                .jump(VPN_ROUTER_CHAIN),
        );
        mangle.chain("OUTPUT").rule(Rule::new().jump(VPN_ROUTER_CHAIN));
    }

    fn filter_table(&self, table: &mut Table, filter: &IpAddressFilter) {
        let cfg = &self.config;
        let ports = &cfg.ports;

        let input = table.chain("INPUT");
        // Only the block-page ports are reachable on the parental-control
        // redirect address
        if let Some(pc_ip) = cfg.parental_control_redirect_ip {
            let to_pc = Rule::new().destination(IpAddr::from(pc_ip));
            input.rule(
                to_pc
                    .clone()
                    .tcp()
                    .destination_port(ports.parental_control_http)
                    .accept(),
            );
            input.rule(
                to_pc
                    .clone()
                    .tcp()
                    .destination_port(ports.parental_control_https)
                    .accept(),
            );
            input.rule(to_pc.clone().tcp().drop());
            input.rule(to_pc.udp().drop());
        }
        // Return traffic for connections the gateway itself opened
        input.rule(Rule::new().states([ConnectionState::Established]).accept());
        // Roaming clients must reach the tunnel server from public addresses
        if cfg.mobile_vpn_server_enabled {
            input.rule(
                Rule::new()
                    .udp()
                    .destination_port(ports.mobile_vpn_server)
                    .accept(),
            );
        }
        // New connections are accepted from any local source, not just the
        // configured LAN prefix: mobile-VPN clients sit in the tunnel subnet
        // and still have to reach the proxy and management ports
        input.rule(
            Rule::new()
                .source(IpNetwork::V4(cfg.network))
                .states([ConnectionState::New])
                .accept(),
        );
        for network in private_networks_v4() {
            input.rule(
                Rule::new()
                    .source(IpNetwork::V4(network))
                    .states([ConnectionState::New])
                    .accept(),
            );
        }
        input.rule(Rule::new().states([ConnectionState::New]).drop());

        let forward = table.chain("FORWARD");
        // Block HTTP/3 so ssl-enabled devices fall back to interceptable TCP
        if cfg.ssl_enabled {
            for ip in sorted_v4(filter.ssl_enabled_devices_ips()) {
                forward.rule(
                    Rule::new()
                        .source(IpAddr::from(ip))
                        .udp()
                        .destination_port(443)
                        .reject(),
                );
            }
        }
        // Tor cannot carry UDP; it must not silently reach the real network
        for ip in sorted_v4(filter.tor_devices_ips()) {
            forward.rule(Rule::new().source(IpAddr::from(ip)).udp().reject());
        }
        if cfg.mobile_vpn_ip.is_some() {
            for ip in sorted_v4(filter.mobile_vpn_devices_private_network_access_ips()) {
                forward.rule(
                    Rule::new()
                        .input_interface(&cfg.mobile_vpn_interface)
                        .source(IpAddr::from(ip))
                        .destination(IpNetwork::V4(cfg.network))
                        .accept(),
                );
            }
            forward.rule(
                Rule::new()
                    .input_interface(&cfg.mobile_vpn_interface)
                    .destination(IpNetwork::V4(cfg.network))
                    .reject(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::devices::VpnState;
    use std::net::Ipv4Addr;

    fn config() -> GeneratorConfig {
        GeneratorConfig::new(
            Ipv4Addr::new(192, 168, 1, 2),
            "192.168.1.0/24".parse().unwrap(),
        )
    }

    #[test]
    fn test_generation_is_pure() {
        let mut cfg = config();
        cfg.dns_enabled = true;
        cfg.ssl_enabled = true;
        cfg.masquerade_enabled = true;
        let filter = IpAddressFilter::new()
            .with_enabled(["192.168.1.42".parse().unwrap(), "192.168.1.7".parse().unwrap()])
            .with_ssl_enabled(["192.168.1.42".parse().unwrap()]);
        let generator = TableGeneratorIp4::new(cfg);

        let first = generator.generate(&filter, &[]);
        let second = generator.generate(&filter, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_client_without_route_degrades_to_no_marks() {
        let generator = TableGeneratorIp4::new(config());
        let filter = IpAddressFilter::new().with_device(
            "device:a",
            ["192.168.1.30".parse::<std::net::IpAddr>().unwrap()],
        );
        let mut client = VpnClientState::new(1, VpnState::Active);
        client.devices.insert("device:a".to_string());
        client.virtual_interface = Some("tun0".to_string());
        // route is None

        let tables = generator.generate(&filter, &[client]);
        let vpn_router = tables.mangle.get(VPN_ROUTER_CHAIN).unwrap();
        assert!(vpn_router.is_empty());
        // Masquerade on the tunnel interface is still emitted
        let post = tables.nat.get("POSTROUTING").unwrap();
        assert!(post.rules().iter().any(|r| r.to_string().contains("-o tun0")));
    }

    #[test]
    fn test_inactive_clients_are_not_rendered() {
        let generator = TableGeneratorIp4::new(config());
        let filter = IpAddressFilter::new().with_device(
            "device:a",
            ["192.168.1.30".parse::<std::net::IpAddr>().unwrap()],
        );
        let mut client = VpnClientState::new(1, VpnState::Inactive);
        client.devices.insert("device:a".to_string());
        client.route = Some(3);

        let tables = generator.generate(&filter, &[client]);
        assert!(tables.mangle.get(VPN_ROUTER_CHAIN).unwrap().is_empty());
    }

    #[test]
    fn test_device_list_order_does_not_matter() {
        let generator = TableGeneratorIp4::new(config());
        let a = IpAddressFilter::new().with_enabled([
            "192.168.1.9".parse().unwrap(),
            "192.168.1.3".parse().unwrap(),
            "192.168.1.120".parse().unwrap(),
        ]);
        let b = IpAddressFilter::new().with_enabled([
            "192.168.1.120".parse().unwrap(),
            "192.168.1.9".parse().unwrap(),
            "192.168.1.3".parse().unwrap(),
        ]);
        assert_eq!(generator.generate(&a, &[]), generator.generate(&b, &[]));
    }
}
