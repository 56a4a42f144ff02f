//! Chains and tables
//!
//! A [`Chain`] is a named, ordered rule list evaluated top to bottom with
//! first-match-wins semantics. A [`Table`] groups chains sharing a purpose
//! (nat, mangle, filter) and preserves chain insertion order so enumeration
//! and rendering are deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::rule::Rule;

/// Named ordered sequence of rules; insertion order is match priority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chain {
    name: String,
    rules: Vec<Rule>,
}

impl Chain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a rule; later rules only see packets no earlier rule matched.
    pub fn rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Named collection of chains, insertion order preserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    name: String,
    chains: Vec<Chain>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chains: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the chain with the given name, creating it at the end of the
    /// table if it does not exist yet.
    pub fn chain(&mut self, name: &str) -> &mut Chain {
        if let Some(index) = self.chains.iter().position(|c| c.name == name) {
            return &mut self.chains[index];
        }
        self.chains.push(Chain::new(name));
        self.chains.last_mut().expect("chain was just pushed")
    }

    pub fn get(&self, name: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.name == name)
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }
}

/// Renders the table in iptables-save style: `*name`, one `:CHAIN` header
/// per chain, then `-A CHAIN <rule>` lines in evaluation order.
impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*{}", self.name)?;
        for chain in &self.chains {
            writeln!(f, ":{}", chain.name)?;
        }
        for chain in &self.chains {
            for rule in &chain.rules {
                writeln!(f, "-A {} {rule}", chain.name)?;
            }
        }
        write!(f, "COMMIT")
    }
}
