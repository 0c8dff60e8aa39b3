//! Bit arithmetic for pseudo network addresses.
//!
//! Every endpoint address carries three identifiers packed right below the
//! network prefix:
//!
//! ```text
//!  31                                                     0
//! +----------------+----------+-----------+---------------+
//! | network prefix |  tenant  |  segment  |   endpoint    |
//! +----------------+----------+-----------+---------------+
//!                   tenant_bits segment_bits endpoint_bits
//! ```
//!
//! All functions are total over `u32`: shifts by 32 or more bits yield zero
//! instead of overflowing, so out-of-range widths degrade to empty fields.

/// Returns a mask with the `bits` lowest bits set.
#[inline]
pub const fn low_bits(bits: u32) -> u32 {
    if bits >= u32::BITS {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

#[inline]
const fn shl(value: u32, by: u32) -> u32 {
    if by >= u32::BITS {
        0
    } else {
        value << by
    }
}

#[inline]
const fn shr(value: u32, by: u32) -> u32 {
    if by >= u32::BITS {
        0
    } else {
        value >> by
    }
}

/// Contiguous mask covering the tenant and segment fields, positioned right
/// above the `endpoint_bits` low bits.
#[inline]
pub const fn tenant_segment_mask(tenant_bits: u32, segment_bits: u32, endpoint_bits: u32) -> u32 {
    shl(low_bits(tenant_bits.saturating_add(segment_bits)), endpoint_bits)
}

/// Combines the pseudo network netmask with the tenant/segment mask.
#[inline]
pub const fn combined_netmask(cidr_mask: u32, tenant_segment_mask: u32) -> u32 {
    cidr_mask | tenant_segment_mask
}

/// Extracts the tenant identifier from `addr`.
#[inline]
pub const fn extract_tenant_id(
    addr: u32,
    endpoint_bits: u32,
    segment_bits: u32,
    tenant_bits: u32,
) -> u32 {
    shr(addr, endpoint_bits.saturating_add(segment_bits)) & low_bits(tenant_bits)
}

/// Extracts the segment identifier from `addr`.
#[inline]
pub const fn extract_segment_id(addr: u32, endpoint_bits: u32, segment_bits: u32) -> u32 {
    shr(addr, endpoint_bits) & low_bits(segment_bits)
}

/// Extracts the endpoint identifier from `addr`.
#[inline]
pub const fn extract_endpoint_id(addr: u32, endpoint_bits: u32) -> u32 {
    addr & low_bits(endpoint_bits)
}

/// The widths of the three identifier fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitWidths {
    /// Tenant field width, the highest of the three.
    pub tenant: u32,
    /// Segment field width.
    pub segment: u32,
    /// Endpoint field width, ending at bit 0.
    pub endpoint: u32,
}

impl BitWidths {
    /// Creates widths from the tenant, segment and endpoint bit counts.
    pub const fn new(tenant: u32, segment: u32, endpoint: u32) -> Self {
        Self { tenant, segment, endpoint }
    }

    /// Number of bits taken by all three fields.
    pub const fn total(&self) -> u32 {
        self.tenant.saturating_add(self.segment).saturating_add(self.endpoint)
    }

    /// See [`tenant_segment_mask`].
    pub const fn tenant_segment_mask(&self) -> u32 {
        tenant_segment_mask(self.tenant, self.segment, self.endpoint)
    }

    /// Tenant identifier of `addr`.
    pub const fn tenant_id(&self, addr: u32) -> u32 {
        extract_tenant_id(addr, self.endpoint, self.segment, self.tenant)
    }

    /// Segment identifier of `addr`.
    pub const fn segment_id(&self, addr: u32) -> u32 {
        extract_segment_id(addr, self.endpoint, self.segment)
    }

    /// Endpoint identifier of `addr`.
    pub const fn endpoint_id(&self, addr: u32) -> u32 {
        extract_endpoint_id(addr, self.endpoint)
    }

    /// Packs the identifiers below `network`. Identifiers wider than their
    /// field are truncated to it.
    pub const fn encode(&self, network: u32, tenant: u32, segment: u32, endpoint: u32) -> u32 {
        let tenant_shift = self.endpoint.saturating_add(self.segment);
        let tenant = shl(tenant & low_bits(self.tenant), tenant_shift);
        let segment = shl(segment & low_bits(self.segment), self.endpoint);
        let endpoint = endpoint & low_bits(self.endpoint);

        network | tenant | segment | endpoint
    }
}
