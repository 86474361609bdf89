//! Scripted connections for pool and retry tests

use std::sync::Arc;

use lanwatch_core::SqlValue;
use parking_lot::Mutex;

use super::connection::{ConnectionFactory, DbConnection, QueryResult};
use super::error::DbError;

#[derive(Default)]
struct ScriptState {
    connects: usize,
    runs: usize,
    commits: usize,
    rollbacks: usize,
    pragmas: Vec<(String, String)>,
    locked_failures: usize,
    failure: Option<String>,
    fail_connects: bool,
    fail_rollbacks: bool,
}

/// Shared handle controlling every connection a [`FakeFactory`] opens.
#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    /// The next `n` statements fail with a lock error.
    pub fn lock_next(&self, n: usize) {
        self.state.lock().locked_failures = n;
    }

    /// Every statement fails with a non-lock error.
    pub fn fail_with(&self, message: &str) {
        self.state.lock().failure = Some(message.to_string());
    }

    pub fn fail_connects(&self, fail: bool) {
        self.state.lock().fail_connects = fail;
    }

    pub fn fail_rollbacks(&self) {
        self.state.lock().fail_rollbacks = true;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn runs(&self) -> usize {
        self.state.lock().runs
    }

    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    pub fn pragmas(&self) -> Vec<(String, String)> {
        self.state.lock().pragmas.clone()
    }
}

pub struct FakeFactory {
    script: Script,
}

impl FakeFactory {
    pub fn new(script: Script) -> Self {
        Self { script }
    }
}

impl ConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    fn connect(&self) -> Result<FakeConnection, DbError> {
        let mut state = self.script.state.lock();
        if state.fail_connects {
            return Err(DbError::connection("fake", "refused"));
        }
        state.connects += 1;
        Ok(FakeConnection {
            script: self.script.clone(),
            in_transaction: false,
        })
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

pub struct FakeConnection {
    script: Script,
    in_transaction: bool,
}

impl DbConnection for FakeConnection {
    fn run(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<QueryResult, DbError> {
        let mut state = self.script.state.lock();
        state.runs += 1;
        if state.locked_failures > 0 {
            state.locked_failures -= 1;
            return Err(DbError::locked("database is locked"));
        }
        if let Some(message) = &state.failure {
            return Err(DbError::Statement(message.clone()));
        }
        Ok(QueryResult {
            rows: Vec::new(),
            rows_affected: 1,
        })
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        if sql.trim().eq_ignore_ascii_case("BEGIN") {
            self.in_transaction = true;
        }
        Ok(())
    }

    fn pragma(&mut self, name: &str, value: &str) -> Result<(), DbError> {
        self.script
            .state
            .lock()
            .pragmas
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.script.state.lock().commits += 1;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        let mut state = self.script.state.lock();
        state.rollbacks += 1;
        if state.fail_rollbacks {
            return Err(DbError::Statement("rollback failed".into()));
        }
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}
