//! Durable record of the firewall rules this host has installed.
//!
//! A rule is identified by its fully rendered body; there is no surrogate
//! key. Each record carries an activation state: `Inactive` means "not known
//! to be resident in the kernel" (a write-ahead record, or one being torn
//! down), `Active` means "installed".
#![doc(issue_tracker_base_url = "https://github.com/romana/romana-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::{fmt, str::FromStr, sync::Arc};

mod memory;
mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

/// Ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record with this body already exists.
    #[error("rule already recorded: {0:?}")]
    Conflict(String),
    /// No record with this body.
    #[error("rule not recorded: {0:?}")]
    NotFound(String),
    /// The backing database failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored record could not be interpreted.
    #[error("corrupt ledger record: {0}")]
    Corrupt(String),
}

/// Result alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Activation state of a recorded rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuleState {
    /// Not known to be resident in the kernel.
    #[default]
    Inactive,
    /// Installed in the kernel.
    Active,
}

impl RuleState {
    /// Name stored in the ledger.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            other => Err(Error::Corrupt(format!("unknown rule state {other:?}"))),
        }
    }
}

/// A ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    body: String,
    /// Activation state as last read from or written to the ledger.
    pub state: RuleState,
}

impl Rule {
    /// A new, inactive rule.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into(), state: RuleState::Inactive }
    }

    /// Sets the state without touching the ledger.
    pub fn with_state(mut self, state: RuleState) -> Self {
        self.state = state;
        self
    }

    /// The rendered rule, which is also its identity.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether the record is [`RuleState::Active`].
    pub fn is_active(&self) -> bool {
        self.state == RuleState::Active
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.body, self.state)
    }
}

/// Persistence for rule records.
///
/// Implementations must reject a second record with the same body
/// ([`Error::Conflict`]) and report missing records as [`Error::NotFound`].
/// Results are returned in insertion order.
pub trait RuleLedger {
    /// Records `rule` with its current state.
    fn add_rule(&self, rule: &Rule) -> Result<()>;

    /// Persists `state` for the record matching `rule`, then updates `rule`.
    fn switch_state(&self, rule: &mut Rule, state: RuleState) -> Result<()>;

    /// Deletes the record matching `rule`.
    fn delete_rule(&self, rule: &Rule) -> Result<()>;

    /// All records whose body contains `substring`.
    fn find_by_substring(&self, substring: &str) -> Result<Vec<Rule>>;

    /// Every record.
    fn list_all(&self) -> Result<Vec<Rule>>;
}

impl<T: RuleLedger + ?Sized> RuleLedger for &T {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        (**self).add_rule(rule)
    }

    fn switch_state(&self, rule: &mut Rule, state: RuleState) -> Result<()> {
        (**self).switch_state(rule, state)
    }

    fn delete_rule(&self, rule: &Rule) -> Result<()> {
        (**self).delete_rule(rule)
    }

    fn find_by_substring(&self, substring: &str) -> Result<Vec<Rule>> {
        (**self).find_by_substring(substring)
    }

    fn list_all(&self) -> Result<Vec<Rule>> {
        (**self).list_all()
    }
}

impl<T: RuleLedger + ?Sized> RuleLedger for Arc<T> {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        (**self).add_rule(rule)
    }

    fn switch_state(&self, rule: &mut Rule, state: RuleState) -> Result<()> {
        (**self).switch_state(rule, state)
    }

    fn delete_rule(&self, rule: &Rule) -> Result<()> {
        (**self).delete_rule(rule)
    }

    fn find_by_substring(&self, substring: &str) -> Result<Vec<Rule>> {
        (**self).find_by_substring(substring)
    }

    fn list_all(&self) -> Result<Vec<Rule>> {
        (**self).list_all()
    }
}

impl<T: RuleLedger + ?Sized> RuleLedger for Box<T> {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        (**self).add_rule(rule)
    }

    fn switch_state(&self, rule: &mut Rule, state: RuleState) -> Result<()> {
        (**self).switch_state(rule, state)
    }

    fn delete_rule(&self, rule: &Rule) -> Result<()> {
        (**self).delete_rule(rule)
    }

    fn find_by_substring(&self, substring: &str) -> Result<Vec<Rule>> {
        (**self).find_by_substring(substring)
    }

    fn list_all(&self) -> Result<Vec<Rule>> {
        (**self).list_all()
    }
}
