use std::path::Path;

use romana_net::{ConfigError, NetworkSettings};
use serde::{Deserialize, Serialize};

use crate::{
    environment::{Environment, EnvironmentKind},
    kernel::DEFAULT_TOOL,
};

/// Host firewall configuration.
///
/// ```toml
/// tool = "/sbin/iptables"
/// environment = "kubernetes"
/// legacy_u32 = false
///
/// [network]
/// tenant_bits = 4
/// segment_bits = 4
/// endpoint_bits = 8
/// pseudo_network = "10.0.0.0/8"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirewallConfig {
    /// Path of the iptables binary.
    pub tool: String,
    /// Platform whose rule set is installed.
    pub environment: EnvironmentKind,
    /// Install the deprecated u32 accept rule when provisioning on OpenStack.
    pub legacy_u32: bool,
    /// Address layout.
    pub network: NetworkSettings,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_owned(),
            environment: EnvironmentKind::default(),
            legacy_u32: false,
            network: NetworkSettings::default(),
        }
    }
}

impl FirewallConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.network.validate()?;
        Ok(config)
    }

    /// Reads and validates the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_toml_str(&std::fs::read_to_string(path)?)?;
        tracing::info!(
            path = %path.display(),
            environment = ?config.environment,
            "loaded firewall config"
        );
        Ok(config)
    }

    /// Selects another platform.
    pub fn with_environment(mut self, environment: EnvironmentKind) -> Self {
        self.environment = environment;
        self
    }

    /// Replaces the address layout.
    pub fn with_network(mut self, network: NetworkSettings) -> Self {
        self.network = network;
        self
    }

    /// Builds the configured [`Environment`].
    pub fn environment(&self) -> Box<dyn Environment> {
        self.environment.build(self.legacy_u32)
    }
}
