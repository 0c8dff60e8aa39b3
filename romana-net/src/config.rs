//! Where the address layout comes from.

use std::{io, sync::Arc};

use ipnetwork::{IpNetworkError, Ipv4Network};
use serde::{Deserialize, Serialize};

use crate::codec::BitWidths;

/// Errors in the address layout or the file it was read from.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The pseudo network is not a usable IPv4 CIDR.
    #[error("invalid pseudo network CIDR {cidr:?}: {reason}")]
    InvalidCidr {
        /// The CIDR as written.
        cidr: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The prefix length or dotted netmask is invalid.
    #[error("invalid netmask {0:?}")]
    InvalidMask(String),
    /// The identifier fields do not fit below the network prefix.
    #[error(
        "tenant ({tenant}) + segment ({segment}) + endpoint ({endpoint}) bits exceed the {available} bits below the network prefix"
    )]
    InvalidWidths {
        /// Tenant field width.
        tenant: u32,
        /// Segment field width.
        segment: u32,
        /// Endpoint field width.
        endpoint: u32,
        /// Bits left below the prefix.
        available: u32,
    },
    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The configuration file is not valid TOML for this layout.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Source of the address layout used on this host.
///
/// Widths are fixed for the lifetime of a host's configuration.
pub trait NetworkConfig {
    /// Width of the tenant identifier.
    fn tenant_bits(&self) -> u32;

    /// Width of the segment identifier.
    fn segment_bits(&self) -> u32;

    /// Width of the endpoint identifier.
    fn endpoint_bits(&self) -> u32;

    /// The pseudo network every endpoint address is allocated from.
    fn pseudo_network(&self) -> Result<Ipv4Network, ConfigError>;

    /// All three widths.
    fn widths(&self) -> BitWidths {
        BitWidths::new(self.tenant_bits(), self.segment_bits(), self.endpoint_bits())
    }

    /// Integer form of the pseudo network netmask.
    fn pseudo_netmask(&self) -> Result<u32, ConfigError> {
        Ok(u32::from(self.pseudo_network()?.mask()))
    }
}

impl<T: NetworkConfig + ?Sized> NetworkConfig for &T {
    fn tenant_bits(&self) -> u32 {
        (**self).tenant_bits()
    }

    fn segment_bits(&self) -> u32 {
        (**self).segment_bits()
    }

    fn endpoint_bits(&self) -> u32 {
        (**self).endpoint_bits()
    }

    fn pseudo_network(&self) -> Result<Ipv4Network, ConfigError> {
        (**self).pseudo_network()
    }
}

impl<T: NetworkConfig + ?Sized> NetworkConfig for Arc<T> {
    fn tenant_bits(&self) -> u32 {
        (**self).tenant_bits()
    }

    fn segment_bits(&self) -> u32 {
        (**self).segment_bits()
    }

    fn endpoint_bits(&self) -> u32 {
        (**self).endpoint_bits()
    }

    fn pseudo_network(&self) -> Result<Ipv4Network, ConfigError> {
        (**self).pseudo_network()
    }
}

/// Parses an IPv4 CIDR written either with a prefix length (`10.0.0.0/8`) or
/// with a dotted netmask (`10.0.0.0/255.0.0.0`). The prefix is required.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Network, ConfigError> {
    let cidr = cidr.trim();
    let Some((_, mask)) = cidr.split_once('/') else {
        return Err(ConfigError::InvalidCidr {
            cidr: cidr.to_owned(),
            reason: "missing prefix length".to_owned(),
        });
    };

    cidr.parse().map_err(|e| match e {
        IpNetworkError::InvalidPrefix => ConfigError::InvalidMask(mask.to_owned()),
        e => ConfigError::InvalidCidr { cidr: cidr.to_owned(), reason: e.to_string() },
    })
}

/// Static address layout, usually read from the host configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSettings {
    /// Width of the tenant identifier.
    pub tenant_bits: u32,
    /// Width of the segment identifier.
    pub segment_bits: u32,
    /// Width of the endpoint identifier.
    pub endpoint_bits: u32,
    /// Kept as text and parsed on access, so that a bad CIDR fails planning
    /// rather than deserialization.
    pub pseudo_network: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            tenant_bits: 4,
            segment_bits: 4,
            endpoint_bits: 8,
            pseudo_network: "10.0.0.0/8".to_owned(),
        }
    }
}

impl NetworkSettings {
    /// Creates settings for the given pseudo network with the default widths.
    pub fn new(pseudo_network: impl Into<String>) -> Self {
        Self { pseudo_network: pseudo_network.into(), ..Default::default() }
    }

    /// Sets the tenant width.
    pub fn with_tenant_bits(mut self, bits: u32) -> Self {
        self.tenant_bits = bits;
        self
    }

    /// Sets the segment width.
    pub fn with_segment_bits(mut self, bits: u32) -> Self {
        self.segment_bits = bits;
        self
    }

    /// Sets the endpoint width.
    pub fn with_endpoint_bits(mut self, bits: u32) -> Self {
        self.endpoint_bits = bits;
        self
    }

    /// Checks that the CIDR parses and that the identifier fields fit below
    /// its prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let network = parse_cidr(&self.pseudo_network)?;
        let available = u32::BITS - u32::from(network.prefix());
        let widths = self.widths();

        if widths.total() > available {
            return Err(ConfigError::InvalidWidths {
                tenant: widths.tenant,
                segment: widths.segment,
                endpoint: widths.endpoint,
                available,
            });
        }

        Ok(())
    }

    /// Deserializes and validates settings from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }
}

impl NetworkConfig for NetworkSettings {
    fn tenant_bits(&self) -> u32 {
        self.tenant_bits
    }

    fn segment_bits(&self) -> u32 {
        self.segment_bits
    }

    fn endpoint_bits(&self) -> u32 {
        self.endpoint_bits
    }

    fn pseudo_network(&self) -> Result<Ipv4Network, ConfigError> {
        parse_cidr(&self.pseudo_network)
    }
}
