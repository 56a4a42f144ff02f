//! Firewall rule data structures and canonical rendering
//!
//! A [`Rule`] is one conditional firewall rule: a set of match predicates and
//! one terminal [`Action`]. Rules are built fluently and are plain immutable
//! values afterwards; deriving a variant from a template is a `clone()`
//! followed by further builder calls, so specializing a copy never touches
//! the template.
//!
//! The [`Display`](fmt::Display) rendering is the canonical token form used
//! as the uniqueness/debugging key. Token order is fixed: interfaces, source,
//! destination, protocol + port match, state match, owner match, action,
//! comment.
//!
//! # Example
//!
//! ```
//! use fwtables::core::rule::Rule;
//!
//! let rule = Rule::new().tcp().destination_port(80).drop();
//! assert_eq!(rule.to_string(), "-p tcp -m tcp --dport 80 -j DROP");
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::validators::validate_comment;

/// Transport protocol matched by a rule
///
/// A rule without a protocol matches any protocol. ICMP never appears in
/// generated tables, so only the two transports exist here.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Protocol {
    /// Transmission Control Protocol
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
}

/// Connection-tracking state matched by a rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum ConnectionState {
    #[strum(serialize = "NEW")]
    New,
    #[strum(serialize = "ESTABLISHED")]
    Established,
    #[strum(serialize = "RELATED")]
    Related,
    #[strum(serialize = "INVALID")]
    Invalid,
    #[strum(serialize = "UNTRACKED")]
    Untracked,
}

/// Terminal effect of a matched rule
///
/// Two actions are equal iff they are the same variant with the same payload.
/// `Jump` renders in the action slot like any other target; evaluation-wise
/// it is only meaningful to the simulator, which continues in the named
/// sub-chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    /// Accept the packet (allow it through)
    Accept,
    /// Drop the packet silently (no response sent)
    Drop,
    /// Reject the packet and send an ICMP unreachable response
    Reject,
    /// Reject the packet with a TCP RST instead of ICMP
    RejectWithTcpReset,
    /// Return from this chain, falling through to the caller's policy
    ReturnFromChain,
    /// Rewrite the destination to the given host and port
    RedirectTo(IpAddr, u16),
    /// Rewrite the source address to the router's own address
    Masquerade,
    /// Tag the packet with an integer for policy routing
    Mark(u32),
    /// Continue evaluation in the named chain
    Jump(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Accept => write!(f, "-j ACCEPT"),
            Action::Drop => write!(f, "-j DROP"),
            Action::Reject => write!(f, "-j REJECT"),
            Action::RejectWithTcpReset => write!(f, "-j REJECT --reject-with tcp-reset"),
            Action::ReturnFromChain => write!(f, "-j RETURN"),
            Action::RedirectTo(IpAddr::V4(host), port) => {
                write!(f, "-j DNAT --to-destination {host}:{port}")
            }
            Action::RedirectTo(IpAddr::V6(host), port) => {
                write!(f, "-j DNAT --to-destination [{host}]:{port}")
            }
            Action::Masquerade => write!(f, "-j MASQUERADE"),
            Action::Mark(value) => write!(f, "-j MARK --set-mark {value}"),
            Action::Jump(chain) => write!(f, "-j {chain}"),
        }
    }
}

/// Destination-port set match, optionally negated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PortSet {
    pub ports: BTreeSet<u16>,
    pub negated: bool,
}

/// Connection-state match, optionally negated
///
/// States keep their insertion order in the rendering; the set is small
/// enough that duplicates are the caller's problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StateMatch {
    pub states: Vec<ConnectionState>,
    pub negated: bool,
}

/// Owner-uid match, optionally negated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OwnerMatch {
    pub uid: u32,
    pub negated: bool,
}

/// One conditional firewall rule: match predicates plus one terminal action
///
/// All predicates are optional; an unset predicate is a wildcard. A rule
/// without an action is a template still under construction and never
/// matches in simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rule {
    pub(crate) input_interface: Option<String>,
    pub(crate) output_interface: Option<String>,
    pub(crate) protocol: Option<Protocol>,
    pub(crate) source: Option<IpNetwork>,
    pub(crate) destination: Option<IpNetwork>,
    pub(crate) destination_port: Option<u16>,
    pub(crate) destination_ports: Option<PortSet>,
    pub(crate) states: Option<StateMatch>,
    pub(crate) owner: Option<OwnerMatch>,
    pub(crate) action: Option<Action>,
    pub(crate) comment: Option<String>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_interface(mut self, name: impl Into<String>) -> Self {
        self.input_interface = Some(name.into());
        self
    }

    pub fn output_interface(mut self, name: impl Into<String>) -> Self {
        self.output_interface = Some(name.into());
        self
    }

    pub fn source(mut self, network: impl Into<IpNetwork>) -> Self {
        self.source = Some(network.into());
        self
    }

    pub fn destination(mut self, network: impl Into<IpNetwork>) -> Self {
        self.destination = Some(network.into());
        self
    }

    pub fn tcp(mut self) -> Self {
        self.protocol = Some(Protocol::Tcp);
        self
    }

    pub fn udp(mut self) -> Self {
        self.protocol = Some(Protocol::Udp);
        self
    }

    pub fn destination_port(mut self, port: u16) -> Self {
        self.destination_port = Some(port);
        self
    }

    pub fn destination_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.destination_ports = Some(PortSet {
            ports: ports.into_iter().collect(),
            negated: false,
        });
        self
    }

    pub fn not_destination_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.destination_ports = Some(PortSet {
            ports: ports.into_iter().collect(),
            negated: true,
        });
        self
    }

    pub fn states(mut self, states: impl IntoIterator<Item = ConnectionState>) -> Self {
        self.states = Some(StateMatch {
            states: states.into_iter().collect(),
            negated: false,
        });
        self
    }

    pub fn not_states(mut self, states: impl IntoIterator<Item = ConnectionState>) -> Self {
        self.states = Some(StateMatch {
            states: states.into_iter().collect(),
            negated: true,
        });
        self
    }

    pub fn owner(mut self, uid: u32) -> Self {
        self.owner = Some(OwnerMatch {
            uid,
            negated: false,
        });
        self
    }

    pub fn not_owner(mut self, uid: u32) -> Self {
        self.owner = Some(OwnerMatch { uid, negated: true });
        self
    }

    /// Attaches a free-text comment to the rule.
    ///
    /// # Errors
    ///
    /// Fails eagerly with [`Error::InvalidComment`](crate::core::error::Error)
    /// if the text contains `"` or a newline; comments are never silently
    /// sanitized.
    pub fn comment(mut self, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        validate_comment(&text)?;
        self.comment = Some(text);
        Ok(self)
    }

    pub fn accept(mut self) -> Self {
        self.action = Some(Action::Accept);
        self
    }

    #[allow(clippy::should_implement_trait)]
    pub fn drop(mut self) -> Self {
        self.action = Some(Action::Drop);
        self
    }

    pub fn reject(mut self) -> Self {
        self.action = Some(Action::Reject);
        self
    }

    pub fn reject_with_tcp_reset(mut self) -> Self {
        self.action = Some(Action::RejectWithTcpReset);
        self
    }

    pub fn return_from_chain(mut self) -> Self {
        self.action = Some(Action::ReturnFromChain);
        self
    }

    pub fn redirect_to(mut self, host: impl Into<IpAddr>, port: u16) -> Self {
        self.action = Some(Action::RedirectTo(host.into(), port));
        self
    }

    pub fn masquerade(mut self) -> Self {
        self.action = Some(Action::Masquerade);
        self
    }

    pub fn mark(mut self, value: u32) -> Self {
        self.action = Some(Action::Mark(value));
        self
    }

    pub fn jump(mut self, chain: impl Into<String>) -> Self {
        self.action = Some(Action::Jump(chain.into()));
        self
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }
}

/// Renders a network as a plain address when it is a single host.
fn format_network(network: &IpNetwork) -> String {
    let host = match network {
        IpNetwork::V4(net) => net.prefix() == 32,
        IpNetwork::V6(net) => net.prefix() == 128,
    };
    if host {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<String> = Vec::with_capacity(8);

        if let Some(ref iface) = self.input_interface {
            tokens.push(format!("-i {iface}"));
        }
        if let Some(ref iface) = self.output_interface {
            tokens.push(format!("-o {iface}"));
        }
        if let Some(ref source) = self.source {
            tokens.push(format!("-s {}", format_network(source)));
        }
        if let Some(ref destination) = self.destination {
            tokens.push(format!("-d {}", format_network(destination)));
        }
        if let Some(protocol) = self.protocol {
            tokens.push(format!("-p {protocol}"));
            if let Some(port) = self.destination_port {
                tokens.push(format!("-m {protocol} --dport {port}"));
            } else if let Some(ref set) = self.destination_ports {
                tokens.push(format!(
                    "-m multiport {}--dports {}",
                    if set.negated { "! " } else { "" },
                    join_ports(&set.ports)
                ));
            }
        } else if let Some(port) = self.destination_port {
            tokens.push(format!("--dport {port}"));
        } else if let Some(ref set) = self.destination_ports {
            tokens.push(format!(
                "-m multiport {}--dports {}",
                if set.negated { "! " } else { "" },
                join_ports(&set.ports)
            ));
        }
        if let Some(ref state_match) = self.states {
            let states = state_match
                .states
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            tokens.push(format!(
                "-m state {}--state {states}",
                if state_match.negated { "! " } else { "" }
            ));
        }
        if let Some(owner) = self.owner {
            tokens.push(format!(
                "-m owner {}--uid-owner {}",
                if owner.negated { "! " } else { "" },
                owner.uid
            ));
        }
        if let Some(ref action) = self.action {
            tokens.push(action.to_string());
        }
        if let Some(ref comment) = self.comment {
            tokens.push(format!("-m comment --comment \"{comment}\""));
        }

        write!(f, "{}", tokens.join(" "))
    }
}

fn join_ports(ports: &BTreeSet<u16>) -> String {
    ports
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
