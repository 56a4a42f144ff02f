//! fwtables - firewall rule-table generation for a filtering gateway
//!
//! Deterministically synthesizes a complete set of nat/mangle/filter rules
//! from a snapshot of device-to-policy assignments and active VPN tunnel
//! state, and verifies the result by simulating packet traversal instead of
//! touching a kernel firewall.
//!
//! # Architecture
//!
//! - [`core`] - Rule/chain/table model, the per-family generators and the
//!   traversal simulator
//! - [`validators`] - Input validation for values embedded in rule text
//!
//! # Guarantees
//!
//! - Generation is a pure function: one immutable snapshot in, one immutable
//!   [`core::generator::FirewallTables`] out, byte-for-byte reproducible
//! - Rule order inside a chain is stable across runs regardless of snapshot
//!   iteration order
//! - Malformed per-client VPN state degrades to missing rules for that
//!   client, never to a failed generation pass

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]

pub mod core;
pub mod validators;

// Re-export commonly used types
pub use core::config::{GeneratorConfig, ServicePorts};
pub use core::devices::{IpAddressFilter, VpnClientState, VpnState};
pub use core::error::{Error, Result};
pub use core::generator::FirewallTables;
pub use core::generator_ip4::TableGeneratorIp4;
pub use core::generator_ip6::TableGeneratorIp6;
pub use core::rule::{Action, ConnectionState, Protocol, Rule};
pub use core::simulator::Simulator;
pub use core::table::{Chain, Table};
