//! Address layout of the pseudo network.
//!
//! Endpoint addresses encode a tenant, a segment and an endpoint identifier
//! as contiguous bit fields. This crate unpacks them ([`codec`]), derives the
//! packet match expression and chain names that isolate a tenant/segment
//! pair ([`filter`]), and describes where the layout comes from
//! ([`config`]).
#![doc(issue_tracker_base_url = "https://github.com/romana/romana-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod codec;
pub mod config;
pub mod filter;

pub use codec::BitWidths;
pub use config::{parse_cidr, ConfigError, NetworkConfig, NetworkSettings};
pub use filter::{EndpointFilter, FilterExpression, CHAIN_NAME_PREFIX};
