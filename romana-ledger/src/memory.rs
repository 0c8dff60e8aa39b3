use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{Error, Result, Rule, RuleLedger, RuleState};

#[derive(Debug, Clone, Copy)]
struct Record {
    /// Insertion sequence, used to return records in insertion order.
    seq: u64,
    state: RuleState,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    records: FxHashMap<String, Record>,
}

impl Inner {
    fn collect(&self, filter: impl Fn(&str) -> bool) -> Vec<Rule> {
        let mut found: Vec<_> = self
            .records
            .iter()
            .filter(|(body, _)| filter(body.as_str()))
            .map(|(body, record)| (record.seq, Rule::new(body.as_str()).with_state(record.state)))
            .collect();

        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, rule)| rule).collect()
    }
}

/// Process-local ledger. Records do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

impl MemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The state recorded for `body`, if any.
    pub fn state_of(&self, body: &str) -> Option<RuleState> {
        self.inner.read().records.get(body).map(|record| record.state)
    }
}

impl RuleLedger for MemoryLedger {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.records.contains_key(rule.body()) {
            return Err(Error::Conflict(rule.body().to_owned()));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.records.insert(rule.body().to_owned(), Record { seq, state: rule.state });

        tracing::trace!(body = rule.body(), state = %rule.state, "recorded rule");
        Ok(())
    }

    fn switch_state(&self, rule: &mut Rule, state: RuleState) -> Result<()> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(rule.body())
            .ok_or_else(|| Error::NotFound(rule.body().to_owned()))?;

        record.state = state;
        rule.state = state;
        Ok(())
    }

    fn delete_rule(&self, rule: &Rule) -> Result<()> {
        self.inner
            .write()
            .records
            .remove(rule.body())
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(rule.body().to_owned()))
    }

    fn find_by_substring(&self, substring: &str) -> Result<Vec<Rule>> {
        Ok(self.inner.read().collect(|body| body.contains(substring)))
    }

    fn list_all(&self) -> Result<Vec<Rule>> {
        Ok(self.inner.read().collect(|_| true))
    }
}
