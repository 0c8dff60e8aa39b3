#![doc(issue_tracker_base_url = "https://github.com/romana/romana-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use romana_exec::{Error as ExecError, Execute, Output, Result as ExecResult, Runner};
pub use romana_firewall::*;
pub use romana_ledger::{MemoryLedger, Rule, RuleLedger, RuleState, SqliteLedger};
pub use romana_net::{
    codec, filter, BitWidths, ConfigError, EndpointFilter, NetworkConfig, NetworkSettings,
};
