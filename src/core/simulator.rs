//! Packet-traversal simulation
//!
//! Replays a synthetic packet through a generated [`Chain`] and reports the
//! [`Action`] of the first matching rule, or [`Action::ReturnFromChain`] when
//! nothing matched and evaluation falls through to whatever the real
//! firewall would apply next. Verification-only; nothing here ever touches a
//! production traffic path.
//!
//! Jump targets registered via [`Simulator::add_sub_chain`] are evaluated
//! with iptables semantics: a sub-chain fallthrough (or an explicit RETURN
//! inside it) resumes evaluation after the jump rule in the owning chain.

use std::net::IpAddr;

use crate::core::rule::{Action, ConnectionState, Protocol, Rule};
use crate::core::table::Chain;

/// Synthetic packet under classification.
#[derive(Debug, Clone, Copy)]
struct Packet {
    protocol: Protocol,
    source: IpAddr,
    destination: IpAddr,
    destination_port: u16,
    state: ConnectionState,
}

pub struct Simulator {
    chain: Chain,
    sub_chains: Vec<Chain>,
    input: Option<String>,
    output: Option<String>,
}

impl Simulator {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            sub_chains: Vec::new(),
            input: None,
            output: None,
        }
    }

    /// Sets the interface the simulated packet ingresses on.
    pub fn set_input(&mut self, interface: impl Into<String>) {
        self.input = Some(interface.into());
    }

    /// Sets the interface the simulated packet would egress on.
    pub fn set_output(&mut self, interface: impl Into<String>) {
        self.output = Some(interface.into());
    }

    pub fn reset_interfaces(&mut self) {
        self.input = None;
        self.output = None;
    }

    /// Registers a chain that `Jump` rules of the owning chain may continue
    /// into. Jumps to unregistered chains are skipped.
    pub fn add_sub_chain(&mut self, chain: Chain) {
        self.sub_chains.push(chain);
    }

    pub fn tcp_packet(&self, source: IpAddr, destination: IpAddr, port: u16) -> Action {
        self.tcp_packet_with_state(source, destination, port, ConnectionState::New)
    }

    pub fn tcp_packet_with_state(
        &self,
        source: IpAddr,
        destination: IpAddr,
        port: u16,
        state: ConnectionState,
    ) -> Action {
        self.classify(Packet {
            protocol: Protocol::Tcp,
            source,
            destination,
            destination_port: port,
            state,
        })
    }

    pub fn udp_packet(&self, source: IpAddr, destination: IpAddr, port: u16) -> Action {
        self.udp_packet_with_state(source, destination, port, ConnectionState::New)
    }

    pub fn udp_packet_with_state(
        &self,
        source: IpAddr,
        destination: IpAddr,
        port: u16,
        state: ConnectionState,
    ) -> Action {
        self.classify(Packet {
            protocol: Protocol::Udp,
            source,
            destination,
            destination_port: port,
            state,
        })
    }

    fn classify(&self, packet: Packet) -> Action {
        self.evaluate(&self.chain, &packet)
            .unwrap_or(Action::ReturnFromChain)
    }

    fn evaluate(&self, chain: &Chain, packet: &Packet) -> Option<Action> {
        for rule in chain.rules() {
            if !self.rule_matches(rule, packet) {
                continue;
            }
            match rule.action() {
                // Templates without an action never terminate evaluation
                None => {}
                Some(Action::Jump(target)) => {
                    if let Some(sub) = self.sub_chains.iter().find(|c| c.name() == target) {
                        match self.evaluate(sub, packet) {
                            // RETURN inside a sub-chain resumes after the jump
                            Some(Action::ReturnFromChain) | None => {}
                            terminal @ Some(_) => return terminal,
                        }
                    }
                }
                Some(action) => return Some(action.clone()),
            }
        }
        None
    }

    fn rule_matches(&self, rule: &Rule, packet: &Packet) -> bool {
        if let Some(ref iface) = rule.input_interface
            && self.input.as_deref() != Some(iface.as_str())
        {
            return false;
        }
        if let Some(ref iface) = rule.output_interface
            && self.output.as_deref() != Some(iface.as_str())
        {
            return false;
        }
        if let Some(protocol) = rule.protocol
            && protocol != packet.protocol
        {
            return false;
        }
        if let Some(ref source) = rule.source
            && !source.contains(packet.source)
        {
            return false;
        }
        if let Some(ref destination) = rule.destination
            && !destination.contains(packet.destination)
        {
            return false;
        }
        if let Some(port) = rule.destination_port
            && port != packet.destination_port
        {
            return false;
        }
        if let Some(ref set) = rule.destination_ports
            && set.ports.contains(&packet.destination_port) == set.negated
        {
            return false;
        }
        if let Some(ref state_match) = rule.states
            && state_match.states.contains(&packet.state) == state_match.negated
        {
            return false;
        }
        // Simulated packets carry no owning uid; owner rules never match
        if rule.owner.is_some() {
            return false;
        }
        true
    }
}
