use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode};
use tracing::{debug, info};

use crate::{Error, Result, Rule, RuleLedger, RuleState};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS iptables_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    body TEXT NOT NULL UNIQUE,
    state TEXT NOT NULL
);";

/// Ledger backed by a SQLite database.
#[derive(Debug)]
pub struct SqliteLedger {
    db: Mutex<Connection>,
}

impl SqliteLedger {
    /// Opens or creates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Connection::open(path)?;

        // Enable WAL mode for concurrent read access
        db.execute_batch("PRAGMA journal_mode=WAL;")?;

        info!(path = %path.display(), "rule ledger opened");
        Self::init(db)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Rule>> {
        let db = self.db.lock();
        let mut stmt = db.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let (body, state) = row?;
            let state: RuleState = state.parse()?;
            rules.push(Rule::new(body).with_state(state));
        }

        Ok(rules)
    }
}

impl RuleLedger for SqliteLedger {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        let result = self.db.lock().execute(
            "INSERT INTO iptables_rules (body, state) VALUES (?1, ?2)",
            rusqlite::params![rule.body(), rule.state.as_str()],
        );

        match result {
            Ok(_) => {
                debug!(body = rule.body(), state = %rule.state, "recorded rule");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(Error::Conflict(rule.body().to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn switch_state(&self, rule: &mut Rule, state: RuleState) -> Result<()> {
        let changed = self.db.lock().execute(
            "UPDATE iptables_rules SET state = ?2 WHERE body = ?1",
            rusqlite::params![rule.body(), state.as_str()],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(rule.body().to_owned()));
        }

        rule.state = state;
        Ok(())
    }

    fn delete_rule(&self, rule: &Rule) -> Result<()> {
        let changed = self
            .db
            .lock()
            .execute("DELETE FROM iptables_rules WHERE body = ?1", rusqlite::params![rule.body()])?;

        if changed == 0 {
            return Err(Error::NotFound(rule.body().to_owned()));
        }

        Ok(())
    }

    fn find_by_substring(&self, substring: &str) -> Result<Vec<Rule>> {
        // instr() is a plain containment test, unlike LIKE it has no wildcards.
        self.query(
            "SELECT body, state FROM iptables_rules WHERE instr(body, ?1) > 0 ORDER BY id",
            rusqlite::params![substring],
        )
    }

    fn list_all(&self) -> Result<Vec<Rule>> {
        self.query("SELECT body, state FROM iptables_rules ORDER BY id", rusqlite::params![])
    }
}
