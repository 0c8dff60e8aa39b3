use romana_exec::Execute;
use romana_ledger::{Rule, RuleLedger, RuleState};
use romana_net::{NetworkConfig, NetworkSettings};
use tracing::{debug, error, info, warn};

use crate::{
    config::FirewallConfig,
    environment::{Environment, Step},
    kernel::Iptables,
    planner::{ChainPlan, ChainPlanner, Endpoint},
    rule::{Placement, RuleSpec, Target},
    Error, Result,
};

/// Whether divert rules are being set up or torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivertAction {
    /// Append the jump rules.
    Install,
    /// Make sure the jump rules are gone.
    Remove,
}

/// What [`Firewall::repair`] did to the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Active records whose rule is resident.
    pub verified: usize,
    /// Inactive records, uninstalled if needed and deleted.
    pub rolled_back: Vec<String>,
    /// Active records whose rule was missing from the kernel, deleted so the
    /// next provisioning installs them again.
    pub dropped: Vec<String>,
}

impl RepairReport {
    /// Whether the ledger already matched the kernel.
    pub fn is_clean(&self) -> bool {
        self.rolled_back.is_empty() && self.dropped.is_empty()
    }
}

/// Keeps kernel iptables state and the rule ledger in step.
///
/// Installing a rule records it as inactive, converges the kernel, then marks
/// the record active. Removal walks the same states backwards. The two stores
/// are not updated atomically; a failure between steps leaves the ledger out
/// of step with the kernel until the operation is re-run or
/// [`Firewall::repair`] is called.
///
/// The engine holds no locks. Callers must serialize operations on the same
/// endpoint.
#[derive(Debug)]
pub struct Firewall<E, L, C = NetworkSettings> {
    kernel: Iptables<E>,
    ledger: L,
    planner: ChainPlanner<C>,
    environment: Box<dyn Environment>,
}

impl<E: Execute, L: RuleLedger> Firewall<E, L, NetworkSettings> {
    /// Creates an engine from a loaded configuration.
    pub fn from_config(config: &FirewallConfig, executor: E, ledger: L) -> Self {
        let kernel = Iptables::new(executor).with_tool(config.tool.as_str());
        Firewall::new(kernel, ledger, config.network.clone()).with_environment(config.environment())
    }
}

impl<E, L, C> Firewall<E, L, C>
where
    E: Execute,
    L: RuleLedger,
    C: NetworkConfig,
{
    /// Creates an engine for the OpenStack environment.
    pub fn new(kernel: Iptables<E>, ledger: L, config: C) -> Self {
        Self {
            kernel,
            ledger,
            planner: ChainPlanner::new(config),
            environment: Box::new(crate::environment::OpenStack::new()),
        }
    }

    /// Provisions with `environment` instead.
    pub fn with_environment(mut self, environment: Box<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// Name of the packet filter backend.
    pub fn provider(&self) -> &'static str {
        "iptables"
    }

    /// The kernel adapter.
    pub fn kernel(&self) -> &Iptables<E> {
        &self.kernel
    }

    /// The rule ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The active environment.
    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    /// Plans the chains for `endpoint` without touching the kernel.
    pub fn plan(&self, endpoint: &Endpoint) -> Result<ChainPlan> {
        Ok(self.planner.plan(endpoint)?)
    }

    /// Whether the kernel has `chain`.
    pub fn chain_exists(&self, chain: &str) -> bool {
        self.kernel.chain_exists(chain)
    }

    /// Indices of the planned chains the kernel does not have.
    pub fn detect_missing_chains(&self, plan: &ChainPlan) -> Vec<usize> {
        plan.chains
            .iter()
            .enumerate()
            .filter(|(_, chain)| !self.chain_exists(&chain.name))
            .map(|(index, _)| index)
            .collect()
    }

    /// Creates the chains at `indices`. Stops at the first failure; chains
    /// created before it are kept.
    pub fn create_chains(&self, plan: &ChainPlan, indices: &[usize]) -> Result<()> {
        for &index in indices {
            let chain = plan.chain(index)?;
            if let Err(e) = self.kernel.create_chain(&chain.name) {
                error!(chain = %chain.name, error = %e, "failed to create chain");
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Whether the kernel has `rule`.
    pub fn rule_exists(&self, rule: &RuleSpec) -> bool {
        self.kernel.rule_exists(rule)
    }

    /// Converges the kernel to `placement` without touching the ledger.
    pub fn ensure_rule(&self, rule: &RuleSpec, placement: Placement) -> Result<()> {
        Ok(self.kernel.ensure_rule(rule, placement)?)
    }

    /// Records `rule`, converges the kernel to `placement` and marks the
    /// record active.
    ///
    /// An existing record is reused and keeps its state until the kernel has
    /// converged. Active records are never marked inactive here.
    pub fn apply(&self, spec: &RuleSpec, placement: Placement) -> Result<Rule> {
        let mut rule = Rule::new(spec.body());

        match self.ledger.add_rule(&rule) {
            Ok(()) => {}
            Err(romana_ledger::Error::Conflict(_)) => {
                debug!(body = rule.body(), "rule already recorded, reusing record");
            }
            Err(e) => {
                error!(body = rule.body(), error = %e, "failed to record rule");
                return Err(e.into());
            }
        }

        if let Err(e) = self.ensure_rule(spec, placement) {
            error!(
                body = rule.body(),
                %placement,
                error = %e,
                "rule recorded but kernel update failed"
            );
            return Err(e);
        }

        if let Err(e) = self.ledger.switch_state(&mut rule, RuleState::Active) {
            error!(body = rule.body(), error = %e, "rule applied but activation failed");
            return Err(e.into());
        }

        Ok(rule)
    }

    /// Marks `rule` inactive, removes it from the kernel and deletes the
    /// record.
    pub fn delete_rule(&self, mut rule: Rule) -> Result<()> {
        let spec: RuleSpec = rule
            .body()
            .parse()
            .map_err(|e| romana_ledger::Error::Corrupt(format!("{e}")))?;

        if let Err(e) = self.ledger.switch_state(&mut rule, RuleState::Inactive) {
            error!(body = rule.body(), error = %e, "failed to deactivate rule");
            return Err(e.into());
        }

        if let Err(e) = self.ensure_rule(&spec, Placement::Absent) {
            error!(body = rule.body(), error = %e, "rule deactivated but kernel removal failed");
            return Err(e);
        }

        if let Err(e) = self.ledger.delete_rule(&rule) {
            error!(body = rule.body(), error = %e, "rule removed but record deletion failed");
            return Err(e.into());
        }

        Ok(())
    }

    /// Installs or removes the rules sending the interface's traffic into
    /// the chain at `index`.
    pub fn divert_traffic(
        &self,
        plan: &ChainPlan,
        index: usize,
        action: DivertAction,
    ) -> Result<()> {
        let chain = plan.chain(index)?;

        let placement = match action {
            DivertAction::Install => Placement::Last,
            DivertAction::Remove => Placement::Absent,
        };

        for spec in chain.divert_rules(&plan.interface) {
            self.apply(&spec, placement)?;
        }

        info!(chain = %chain.name, interface = %plan.interface, ?action, "diverted traffic");
        Ok(())
    }

    /// Installs the rules attached to the chain at `index` at the head of
    /// the chain.
    pub fn create_rules(&self, plan: &ChainPlan, index: usize) -> Result<()> {
        let chain = plan.chain(index)?;
        for spec in &chain.rules {
            self.apply(spec, Placement::First)?;
        }
        Ok(())
    }

    /// Appends `<chain> -j <target>` to the chain at `index`.
    pub fn create_default_rule(
        &self,
        plan: &ChainPlan,
        index: usize,
        target: Target,
    ) -> Result<Rule> {
        let chain = plan.chain(index)?;
        let spec = RuleSpec::Default { chain: chain.name.clone(), target };
        let rule = self.apply(&spec, Placement::Last)?;
        info!(chain = %chain.name, %target, "default rule in place");
        Ok(rule)
    }

    /// [`Firewall::create_default_rule`] with [`Target::Drop`].
    pub fn create_default_drop_rule(&self, plan: &ChainPlan, index: usize) -> Result<Rule> {
        self.create_default_rule(plan, index, Target::Drop)
    }

    /// Appends the u32 rule accepting traffic whose source and destination
    /// carry the endpoint's tenant and segment.
    #[deprecated(note = "the u32 match predates per-chain isolation; use default rules")]
    pub fn create_u32_rule(&self, plan: &ChainPlan, index: usize) -> Result<Rule> {
        self.apply_u32(plan, index)
    }

    fn apply_u32(&self, plan: &ChainPlan, index: usize) -> Result<Rule> {
        let chain = plan.chain(index)?;
        let spec = RuleSpec::U32 {
            chain: chain.name.clone(),
            expression: plan.filter.expression.to_string(),
        };
        self.apply(&spec, Placement::Last)
    }

    /// Plans the endpoint's chains and installs the environment's rule set.
    pub fn provision_endpoint(&self, endpoint: &Endpoint) -> Result<ChainPlan> {
        let plan = self.plan(endpoint)?;
        self.provision(&plan)?;
        Ok(plan)
    }

    /// Installs the environment's rule set for an existing plan, including
    /// any rules attached to it with [`ChainPlan::set_default_rules`].
    pub fn provision(&self, plan: &ChainPlan) -> Result<()> {
        info!(
            interface = %plan.interface,
            environment = self.environment.name(),
            "provisioning endpoint"
        );

        for step in self.environment.steps(plan) {
            match step {
                Step::CreateMissingChains => {
                    let missing = self.detect_missing_chains(plan);
                    self.create_chains(plan, &missing)?;
                }
                Step::CreateRules(index) => self.create_rules(plan, index)?,
                Step::DivertTraffic(index) => {
                    self.divert_traffic(plan, index, DivertAction::Install)?;
                }
                Step::DefaultRule(index, target) => {
                    self.create_default_rule(plan, index, target)?;
                }
                Step::LegacyU32(index) => {
                    self.apply_u32(plan, index)?;
                }
            }
        }

        Ok(())
    }

    /// Removes every active rule mentioning the endpoint's interface.
    pub fn cleanup(&self, endpoint: &Endpoint) -> Result<()> {
        self.delete_rules_by_substring(&endpoint.interface).map_err(|e| {
            error!(interface = %endpoint.interface, error = %e, "failed to clean up endpoint");
            e
        })
    }

    /// Removes every active rule whose body contains `substring`.
    ///
    /// Inactive records are skipped; they are not expected to be resident.
    pub fn delete_rules_by_substring(&self, substring: &str) -> Result<()> {
        for rule in self.ledger.find_by_substring(substring)? {
            if !rule.is_active() {
                debug!(body = rule.body(), "skipping inactive rule");
                continue;
            }
            self.delete_rule(rule)?;
        }
        Ok(())
    }

    /// Every ledger record.
    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.ledger.list_all()?)
    }

    /// Reconciles every ledger record with the kernel.
    ///
    /// Inactive records belong to an interrupted install or removal and are
    /// rolled back. Active records whose rule is gone are deleted.
    pub fn repair(&self) -> Result<RepairReport> {
        let mut report = RepairReport::default();

        for rule in self.ledger.list_all()? {
            let spec: RuleSpec = rule
                .body()
                .parse()
                .map_err(|e| romana_ledger::Error::Corrupt(format!("{e}")))?;

            match rule.state {
                RuleState::Inactive => {
                    self.ensure_rule(&spec, Placement::Absent)?;
                    self.ledger.delete_rule(&rule)?;
                    report.rolled_back.push(rule.body().to_owned());
                }
                RuleState::Active if self.rule_exists(&spec) => report.verified += 1,
                RuleState::Active => {
                    warn!(body = rule.body(), "active rule missing from kernel");
                    self.ledger.delete_rule(&rule)?;
                    report.dropped.push(rule.body().to_owned());
                }
            }
        }

        info!(
            verified = report.verified,
            rolled_back = report.rolled_back.len(),
            dropped = report.dropped.len(),
            "ledger repaired"
        );

        Ok(report)
    }
}
