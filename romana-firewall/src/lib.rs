//! Per-tenant and per-segment isolation for romana endpoints with iptables.
//!
//! [`ChainPlanner`] derives the chains an endpoint needs from the tenant and
//! segment bits of its address. [`Firewall`] installs and removes the rules
//! around those chains, tracking each rule in a [`RuleLedger`] so that
//! repeated and interrupted operations converge.
//!
//! [`RuleLedger`]: romana_ledger::RuleLedger
#![doc(issue_tracker_base_url = "https://github.com/romana/romana-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
mod engine;
mod error;
mod kernel;

pub mod environment;
pub mod planner;
pub mod rule;

pub use config::FirewallConfig;
pub use engine::{DivertAction, Firewall, RepairReport};
pub use environment::{Environment, EnvironmentKind, Kubernetes, OpenStack, Step};
pub use error::{Error, Result};
pub use kernel::{Iptables, DEFAULT_TOOL};
pub use planner::{Chain, ChainPlan, ChainPlanner, Endpoint};
pub use rule::{BaseChain, Direction, ParseRuleError, Placement, RuleSpec, Target};
