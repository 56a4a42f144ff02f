//! Core table-generation functionality
//!
//! This module contains the types and logic for synthesizing firewall rule
//! tables from device/VPN state. It provides:
//!
//! - [`rule`]: Rules, actions and their canonical token rendering
//! - [`table`]: Chains and tables
//! - [`devices`]: Device snapshot and anonymization-VPN client state
//! - [`config`]: The generator configuration surface
//! - [`generator_ip4`] / [`generator_ip6`]: The per-family table generators
//! - [`simulator`]: Packet-traversal verification of generated chains
//! - [`error`]: Error types

pub mod config;
pub mod devices;
pub mod error;
pub mod generator;
pub mod generator_ip4;
pub mod generator_ip6;
pub mod rule;
pub mod simulator;
pub mod table;

#[cfg(test)]
pub mod test_helpers;
