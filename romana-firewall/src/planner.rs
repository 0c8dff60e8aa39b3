//! Chain layout for an endpoint.

use std::net::Ipv4Addr;

use romana_net::{ConfigError, EndpointFilter, NetworkConfig};
use tracing::debug;

use crate::{
    rule::{BaseChain, Direction, RuleSpec},
    Error, Result,
};

/// Index of the chain receiving traffic addressed to the host.
pub const INPUT: usize = 0;
/// Index of the chain receiving traffic originated by the host.
pub const OUTPUT: usize = 1;
/// Index of the per-interface forwarding chain.
pub const FORWARD_IN: usize = 2;
/// Index of the tenant-wide forwarding chain.
pub const FORWARD_OUT: usize = 3;

/// A virtual interface to isolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host side interface name, e.g. `tap123`.
    pub interface: String,
    /// Address allocated to the endpoint.
    pub addr: Ipv4Addr,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(interface: impl Into<String>, addr: Ipv4Addr) -> Self {
        Self { interface: interface.into(), addr }
    }
}

/// A chain to create and the rules that belong in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Kernel chain that traffic is diverted from.
    pub base: BaseChain,
    /// Interface sides bound by divert rules.
    pub directions: Vec<Direction>,
    /// Kernel chain name.
    pub name: String,
    /// Rules installed at the head of the chain by `create_rules`.
    pub rules: Vec<RuleSpec>,
}

impl Chain {
    /// A chain with no attached rules.
    pub fn new(base: BaseChain, directions: &[Direction], name: impl Into<String>) -> Self {
        Self { base, directions: directions.to_vec(), name: name.into(), rules: Vec::new() }
    }

    /// The jump rules that send an interface's traffic into this chain.
    pub fn divert_rules(&self, interface: &str) -> Vec<RuleSpec> {
        self.directions
            .iter()
            .map(|&direction| RuleSpec::Divert {
                base: self.base,
                direction,
                interface: interface.to_owned(),
                chain: self.name.clone(),
            })
            .collect()
    }
}

/// The chains that isolate one endpoint, indexed by [`INPUT`], [`OUTPUT`],
/// [`FORWARD_IN`] and [`FORWARD_OUT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    /// Interface the plan was made for.
    pub interface: String,
    /// Identifiers and match derived from the endpoint address.
    pub filter: EndpointFilter,
    /// Planned chains.
    pub chains: Vec<Chain>,
}

impl ChainPlan {
    /// The chain at `index`, or [`Error::NotFound`].
    pub fn chain(&self, index: usize) -> Result<&Chain> {
        self.chains.get(index).ok_or_else(|| Error::NotFound(format!("chain index {index}")))
    }

    /// Attaches match rules to a chain. Each entry is the part of the rule
    /// after the chain name.
    pub fn set_default_rules<I, S>(&mut self, index: usize, matches: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chain = self
            .chains
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("chain index {index}")))?;

        for args in matches {
            chain.rules.push(RuleSpec::matching(chain.name.as_str(), args.as_ref()));
        }

        Ok(())
    }
}

/// Derives the chains for an endpoint from the address layout.
#[derive(Debug, Clone)]
pub struct ChainPlanner<C> {
    config: C,
}

impl<C: NetworkConfig> ChainPlanner<C> {
    /// Plans against `config`.
    pub fn new(config: C) -> Self {
        Self { config }
    }

    /// The address layout.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Plans the four chains for `endpoint`.
    pub fn plan(&self, endpoint: &Endpoint) -> std::result::Result<ChainPlan, ConfigError> {
        let filter = EndpointFilter::build(endpoint.addr, &self.config)?;
        let prefix = filter.chain_prefix();

        let chains = vec![
            Chain::new(BaseChain::Input, &[Direction::Ingress], format!("{prefix}INPUT")),
            Chain::new(BaseChain::Output, &[Direction::Egress], format!("{prefix}OUTPUT")),
            Chain::new(BaseChain::Forward, &[Direction::Ingress], format!("{prefix}FORWARD")),
            Chain::new(BaseChain::Forward, &[Direction::Egress], filter.tenant_chain()),
        ];

        debug!(interface = %endpoint.interface, %prefix, "planned chains");

        Ok(ChainPlan { interface: endpoint.interface.clone(), filter, chains })
    }
}
