use romana_exec::{Execute, Output};
use tracing::{debug, info};

use crate::rule::{Placement, RuleSpec};

/// Default path of the iptables binary.
pub const DEFAULT_TOOL: &str = "/sbin/iptables";

/// Kernel adapter issuing iptables commands through an [`Execute`]
/// implementation.
///
/// Existence checks report any command failure as absence. A missing tool
/// therefore looks the same as a missing chain or rule; the failure is only
/// visible in the debug log.
#[derive(Debug, Clone)]
pub struct Iptables<E> {
    executor: E,
    tool: String,
}

impl<E: Execute> Iptables<E> {
    /// Runs [`DEFAULT_TOOL`] through `executor`.
    pub fn new(executor: E) -> Self {
        Self { executor, tool: DEFAULT_TOOL.to_owned() }
    }

    /// Uses another iptables binary.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Path of the iptables binary.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// The underlying executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn run(&self, flag: &str, args: Vec<String>) -> romana_exec::Result<Output> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(flag.to_owned());
        argv.extend(args);
        self.executor.execute(&self.tool, &argv)
    }

    /// `-L <chain>`
    pub fn chain_exists(&self, chain: &str) -> bool {
        match self.run("-L", vec![chain.to_owned()]) {
            Ok(_) => true,
            Err(e) => {
                debug!(chain, error = %e, "chain check failed, assuming absent");
                false
            }
        }
    }

    /// `-N <chain>`
    pub fn create_chain(&self, chain: &str) -> romana_exec::Result<()> {
        self.run("-N", vec![chain.to_owned()])?;
        info!(chain, "created chain");
        Ok(())
    }

    /// `-C <rule>`
    pub fn rule_exists(&self, rule: &RuleSpec) -> bool {
        match self.run("-C", rule.args()) {
            Ok(_) => true,
            Err(e) => {
                debug!(%rule, error = %e, "rule check failed, assuming absent");
                false
            }
        }
    }

    /// `-A <rule>`
    pub fn append_rule(&self, rule: &RuleSpec) -> romana_exec::Result<()> {
        self.run("-A", rule.args()).map(drop)
    }

    /// `-I <rule>`
    pub fn insert_rule(&self, rule: &RuleSpec) -> romana_exec::Result<()> {
        self.run("-I", rule.args()).map(drop)
    }

    /// `-D <rule>`
    pub fn delete_rule(&self, rule: &RuleSpec) -> romana_exec::Result<()> {
        self.run("-D", rule.args()).map(drop)
    }

    /// Converges the kernel to `placement` for `rule`.
    ///
    /// Issues at most one mutating command; a rule already in the desired
    /// state only costs the existence check.
    pub fn ensure_rule(&self, rule: &RuleSpec, placement: Placement) -> romana_exec::Result<()> {
        let exists = self.rule_exists(rule);

        let result = match (exists, placement) {
            (true, Placement::Absent) => self.delete_rule(rule),
            (false, Placement::Last) => self.append_rule(rule),
            (false, Placement::First) => self.insert_rule(rule),
            _ => {
                debug!(%rule, %placement, exists, "nothing to do");
                return Ok(());
            }
        };

        match &result {
            Ok(()) => info!(%rule, %placement, "rule updated"),
            Err(e) => debug!(%rule, %placement, error = %e, "rule update failed"),
        }

        result
    }
}
