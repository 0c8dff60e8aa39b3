//! Packet match expressions for the `u32` iptables module.
//!
//! Traffic is only allowed to flow between endpoints that carry the same
//! tenant and segment bits. The expression built here compares both the
//! source (offset 12) and the destination (offset 16) address of the IPv4
//! header against the interface's own tenant/segment bits. The interface
//! address is the one being assigned, never one read from a packet, so it
//! can be trusted.

use std::{fmt, net::Ipv4Addr};

use crate::{
    codec::combined_netmask,
    config::{ConfigError, NetworkConfig},
};

/// Offset of the source address in the IPv4 header.
pub const SOURCE_OFFSET: u8 = 12;
/// Offset of the destination address in the IPv4 header.
pub const DESTINATION_OFFSET: u8 = 16;

/// Prefix shared by every chain this crate names.
pub const CHAIN_NAME_PREFIX: &str = "ROMANA";

/// `<offset>&<mask>=<value>` for both address offsets, rendered as
/// `12&0xMASK=0xVALUE && 16&0xMASK=0xVALUE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterExpression {
    /// Bits compared at both offsets.
    pub mask: u32,
    /// Expected value of the masked bits.
    pub value: u32,
}

impl FilterExpression {
    /// Matches addresses sharing `addr`'s bits under `mask`.
    pub const fn new(mask: u32, addr: u32) -> Self {
        Self { mask, value: addr & mask }
    }

    /// Whether a packet with the given source and destination would match.
    pub const fn matches(&self, source: u32, destination: u32) -> bool {
        (source & self.mask) == self.value && (destination & self.mask) == self.value
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { mask, value } = self;
        write!(
            f,
            "{SOURCE_OFFSET}&0x{mask:X}=0x{value:X} && {DESTINATION_OFFSET}&0x{mask:X}=0x{value:X}"
        )
    }
}

/// Returns the pseudo network netmask combined with the tenant/segment mask.
pub fn full_mask<C: NetworkConfig + ?Sized>(config: &C) -> Result<u32, ConfigError> {
    let cidr_mask = config.pseudo_netmask()?;
    Ok(combined_netmask(cidr_mask, config.widths().tenant_segment_mask()))
}

/// Everything the firewall derives from a single endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointFilter {
    /// The endpoint address.
    pub addr: Ipv4Addr,
    /// Tenant identifier carried by `addr`.
    pub tenant_id: u32,
    /// Segment identifier carried by `addr`.
    pub segment_id: u32,
    /// Match for traffic within the tenant/segment pair.
    pub expression: FilterExpression,
}

impl EndpointFilter {
    /// Derives the filter for `addr` under `config`.
    pub fn build<C: NetworkConfig + ?Sized>(
        addr: Ipv4Addr,
        config: &C,
    ) -> Result<Self, ConfigError> {
        let mask = full_mask(config)?;
        let bits = u32::from(addr);
        let widths = config.widths();

        let filter = Self {
            addr,
            tenant_id: widths.tenant_id(bits),
            segment_id: widths.segment_id(bits),
            expression: FilterExpression::new(mask, bits),
        };

        tracing::debug!(
            %addr,
            tenant = filter.tenant_id,
            segment = filter.segment_id,
            expression = %filter.expression,
            "built endpoint filter"
        );

        Ok(filter)
    }

    /// `ROMANA-T<tenant>S<segment>-`, the prefix of every per-interface chain.
    pub fn chain_prefix(&self) -> String {
        format!("{CHAIN_NAME_PREFIX}-T{}S{}-", self.tenant_id, self.segment_id)
    }

    /// `ROMANA-T<tenant>`, the vector chain shared by all of a tenant's interfaces.
    pub fn tenant_chain(&self) -> String {
        format!("{CHAIN_NAME_PREFIX}-T{}", self.tenant_id)
    }
}
