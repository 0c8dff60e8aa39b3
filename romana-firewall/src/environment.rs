//! Per-platform rule sets.
//!
//! Each orchestration platform wants a different set of rules around the
//! same chains. An [`Environment`] turns a [`ChainPlan`] into the ordered
//! list of [`Step`]s the engine executes for it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    planner::{ChainPlan, FORWARD_IN, INPUT, OUTPUT},
    rule::Target,
};

/// One engine operation against a planned chain, referenced by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Creates every planned chain the kernel lacks.
    CreateMissingChains,
    /// Installs the rules attached to the chain.
    CreateRules(usize),
    /// Sends the interface's traffic into the chain.
    DivertTraffic(usize),
    /// Appends a catch-all rule with the given target.
    DefaultRule(usize, Target),
    /// Deprecated u32 accept rule.
    LegacyU32(usize),
}

/// Rule set for an orchestration platform.
pub trait Environment: fmt::Debug + Send + Sync {
    /// Name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// The steps provisioning `plan` takes, in order.
    fn steps(&self, plan: &ChainPlan) -> Vec<Step>;
}

/// Instances get every chain with its attached rules, and forwarded
/// traffic is dropped unless accepted earlier in the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenStack {
    legacy_u32: bool,
}

impl OpenStack {
    /// OpenStack without the u32 rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept same tenant and segment traffic on the forward chain with
    /// a u32 match.
    pub fn with_legacy_u32(mut self, enabled: bool) -> Self {
        self.legacy_u32 = enabled;
        self
    }
}

impl Environment for OpenStack {
    fn name(&self) -> &'static str {
        "openstack"
    }

    fn steps(&self, plan: &ChainPlan) -> Vec<Step> {
        let mut steps = vec![Step::CreateMissingChains];

        for index in 0..plan.chains.len() {
            steps.push(Step::CreateRules(index));
            steps.push(Step::DivertTraffic(index));
        }

        if self.legacy_u32 {
            steps.push(Step::LegacyU32(FORWARD_IN));
        }
        steps.push(Step::DefaultRule(FORWARD_IN, Target::Drop));

        steps
    }
}

/// Host to pod traffic is allowed; forwarding is closed by default and the
/// tenant chain is left to the policy layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Kubernetes;

impl Environment for Kubernetes {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    fn steps(&self, plan: &ChainPlan) -> Vec<Step> {
        let mut steps = vec![Step::CreateMissingChains];
        steps.extend((0..plan.chains.len()).map(Step::DivertTraffic));
        steps.extend([
            Step::DefaultRule(INPUT, Target::Accept),
            Step::DefaultRule(OUTPUT, Target::Accept),
            Step::DefaultRule(FORWARD_IN, Target::Drop),
        ]);
        steps
    }
}

/// Configuration switch selecting an [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    /// [`Kubernetes`].
    Kubernetes,
    /// [`OpenStack`].
    #[default]
    OpenStack,
}

impl EnvironmentKind {
    /// Builds the environment. `legacy_u32` only affects OpenStack.
    pub fn build(self, legacy_u32: bool) -> Box<dyn Environment> {
        match self {
            Self::Kubernetes => Box::new(Kubernetes),
            Self::OpenStack => Box::new(OpenStack::new().with_legacy_u32(legacy_u32)),
        }
    }
}
