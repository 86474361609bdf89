//! Database manager - retry on lock, startup schema check
//!
//! All statements go through [`DatabaseManager::with_retry`]. A statement
//! that hits SQLite's write lock (after the connection's own busy timeout)
//! is retried on a fresh pooled connection with exponential backoff:
//! `base_delay * 2^attempt`. Any other error is returned at once.
//!
//! Backoff uses a blocking sleep. Call from a blocking context
//! (`tokio::task::spawn_blocking`), never directly on the async executor.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lanwatch_core::SqlValue;

use super::connection::{ConnectionFactory, DbConnection, QueryResult, SqliteFactory};
use super::error::DbError;
use super::pool::{ConnectionPool, PoolConfig, PoolStatus};
use super::schema::{SchemaContract, SchemaReport, INDEXES, SCHEMA};

/// Whether a statement changes data. Writes are committed after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// Guess from leading SQL keyword, for callers that only hold raw SQL.
    ///
    /// Leading comments and CTEs defeat this; prefer passing the kind.
    pub fn infer(sql: &str) -> Self {
        let verb = sql
            .trim_start()
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or("");
        if ["insert", "update", "delete", "replace"]
            .iter()
            .any(|w| verb.eq_ignore_ascii_case(w))
        {
            Self::Write
        } else {
            Self::Read
        }
    }
}

/// Retry budget for lock errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

    /// Delay before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Self::DEFAULT_BASE_DELAY,
        }
    }
}

pub struct DatabaseManager<F: ConnectionFactory = SqliteFactory> {
    pool: ConnectionPool<F>,
    retry: RetryPolicy,
    contract: SchemaContract,
    schema_validated: AtomicBool,
}

impl DatabaseManager<SqliteFactory> {
    /// Manager for a SQLite file with the dashboard schema contract.
    pub fn sqlite(path: impl Into<std::path::PathBuf>, pool: PoolConfig, retry: RetryPolicy) -> Self {
        Self::new(
            ConnectionPool::new(SqliteFactory::new(path), pool),
            retry,
            SchemaContract::dashboard(),
        )
    }
}

impl<F: ConnectionFactory> DatabaseManager<F> {
    pub fn new(pool: ConnectionPool<F>, retry: RetryPolicy, contract: SchemaContract) -> Self {
        Self {
            pool,
            retry,
            contract,
            schema_validated: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.pool
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Run `op` on a pooled connection, retrying lock errors.
    ///
    /// `max_retries` overrides the policy for this call. `op` may run more
    /// than once, each time on a freshly checked-out connection.
    pub fn with_retry<T>(
        &self,
        kind: StatementKind,
        max_retries: Option<u32>,
        mut op: impl FnMut(&mut F::Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let max_retries = max_retries.unwrap_or(self.retry.max_retries);
        let mut attempt = 0;
        loop {
            match self.attempt(kind, &mut op) {
                Err(e) if e.is_locked() && attempt < max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "database locked, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    if e.is_locked() {
                        tracing::error!(attempts = attempt + 1, error = %e, "database still locked, giving up");
                    }
                    return Err(e);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    fn attempt<T>(
        &self,
        kind: StatementKind,
        op: &mut impl FnMut(&mut F::Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut conn = self.pool.get_connection()?;
        let value = op(&mut *conn)?;
        if kind == StatementKind::Write {
            conn.commit()?;
        }
        Ok(value)
    }

    /// Execute one statement with retry-on-lock.
    ///
    /// Rows are read out before the connection returns to the pool.
    pub fn execute_with_retry(
        &self,
        sql: &str,
        params: &[SqlValue],
        kind: StatementKind,
        max_retries: Option<u32>,
    ) -> Result<QueryResult, DbError> {
        self.with_retry(kind, max_retries, |conn| conn.run(sql, params))
    }

    /// Create the dashboard tables, views and indexes if absent.
    pub fn apply_schema(&self) -> Result<(), DbError> {
        self.with_retry(StatementKind::Write, None, |conn| {
            conn.execute_batch(SCHEMA)?;
            conn.execute_batch(INDEXES)
        })?;
        tracing::info!(target_db = %self.pool.factory().describe(), "schema applied");
        Ok(())
    }

    /// Check the required tables and views exist.
    ///
    /// Once a check passes it is never repeated: later calls report valid
    /// without touching the database, even if objects were dropped since.
    pub fn validate_schema(&self) -> Result<SchemaReport, DbError> {
        if self.schema_validated.load(Ordering::Acquire) {
            return Ok(SchemaReport::valid());
        }

        let catalog = self.execute_with_retry(
            "SELECT name, type FROM sqlite_master WHERE type IN ('table', 'view')",
            &[],
            StatementKind::Read,
            None,
        )?;

        let mut tables = BTreeSet::new();
        let mut views = BTreeSet::new();
        for row in &catalog.rows {
            let name = row.get("name").and_then(|v| v.as_str());
            let kind = row.get("type").and_then(|v| v.as_str());
            match (name, kind) {
                (Some(name), Some("table")) => {
                    tables.insert(name.to_string());
                }
                (Some(name), Some("view")) => {
                    views.insert(name.to_string());
                }
                _ => {}
            }
        }

        let missing = self.contract.missing(&tables, &views);
        if missing.is_empty() {
            self.schema_validated.store(true, Ordering::Release);
            tracing::info!("schema validated");
            Ok(SchemaReport::valid())
        } else {
            tracing::warn!(missing = ?missing, "schema incomplete");
            Ok(SchemaReport {
                valid: false,
                missing,
            })
        }
    }

    pub fn schema_validated(&self) -> bool {
        self.schema_validated.load(Ordering::Acquire)
    }

    /// Close idle connections. Checked-out connections are unaffected.
    pub fn shutdown(&self) {
        self.pool.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{FakeFactory, Script};
    use serde_json::json;
    use std::time::Instant;
    use tempfile::TempDir;

    fn fake(max_retries: u32) -> (DatabaseManager<FakeFactory>, Script) {
        let script = Script::default();
        let manager = DatabaseManager::new(
            ConnectionPool::new(FakeFactory::new(script.clone()), PoolConfig::default()),
            RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(1),
            },
            SchemaContract::dashboard(),
        );
        (manager, script)
    }

    fn sqlite(dir: &TempDir) -> DatabaseManager {
        DatabaseManager::sqlite(
            dir.path().join("dash.db"),
            PoolConfig::default(),
            RetryPolicy::default(),
        )
    }

    #[test]
    fn infer_statement_kind() {
        assert_eq!(StatementKind::infer("  insert into t values (1)"), StatementKind::Write);
        assert_eq!(StatementKind::infer("UPDATE t SET a = 1"), StatementKind::Write);
        assert_eq!(StatementKind::infer("Delete FROM t"), StatementKind::Write);
        assert_eq!(StatementKind::infer("SELECT * FROM t"), StatementKind::Read);
        assert_eq!(StatementKind::infer(""), StatementKind::Read);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn succeeds_after_transient_locks() {
        let (manager, script) = fake(3);
        script.lock_next(2);
        manager
            .execute_with_retry("SELECT 1", &[], StatementKind::Read, None)
            .unwrap();
        assert_eq!(script.runs(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let (manager, script) = fake(3);
        script.lock_next(usize::MAX);
        let err = manager
            .execute_with_retry("SELECT 1", &[], StatementKind::Read, None)
            .unwrap_err();
        assert!(err.is_locked());
        assert_eq!(script.runs(), 4);
    }

    #[test]
    fn per_call_retry_override() {
        let (manager, script) = fake(3);
        script.lock_next(usize::MAX);
        let err = manager
            .execute_with_retry("SELECT 1", &[], StatementKind::Read, Some(0))
            .unwrap_err();
        assert!(err.is_locked());
        assert_eq!(script.runs(), 1);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let (manager, script) = fake(3);
        script.fail_with("syntax error");
        let err = manager
            .execute_with_retry("SELEC 1", &[], StatementKind::Read, None)
            .unwrap_err();
        assert!(matches!(err, DbError::Statement(_)));
        assert_eq!(script.runs(), 1);
    }

    #[test]
    fn writes_commit_and_reads_do_not() {
        let (manager, script) = fake(0);
        manager
            .execute_with_retry("SELECT 1", &[], StatementKind::Read, None)
            .unwrap();
        assert_eq!(script.commits(), 0);
        manager
            .execute_with_retry("INSERT INTO t VALUES (1)", &[], StatementKind::Write, None)
            .unwrap();
        assert_eq!(script.commits(), 1);
    }

    #[test]
    fn backoff_sleeps_between_attempts() {
        let script = Script::default();
        let manager = DatabaseManager::new(
            ConnectionPool::new(FakeFactory::new(script.clone()), PoolConfig::default()),
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(20),
            },
            SchemaContract::dashboard(),
        );
        script.lock_next(2);
        let start = Instant::now();
        manager
            .execute_with_retry("SELECT 1", &[], StatementKind::Read, None)
            .unwrap();
        // 20ms + 40ms
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn connections_return_to_pool_between_calls() {
        let (manager, script) = fake(0);
        for _ in 0..5 {
            manager
                .execute_with_retry("SELECT 1", &[], StatementKind::Read, None)
                .unwrap();
        }
        assert_eq!(script.connects(), 1);
        assert_eq!(manager.pool_status().idle, 1);
    }

    #[test]
    fn schema_validation_is_sticky() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite(&dir);
        manager.apply_schema().unwrap();
        manager
            .execute_with_retry("DROP TABLE devices", &[], StatementKind::Write, None)
            .unwrap();

        let report = manager.validate_schema().unwrap();
        assert!(!report.valid);
        assert!(report.missing.contains(&"table:devices".to_string()));
        assert!(!manager.schema_validated());

        manager.apply_schema().unwrap();
        assert_eq!(manager.validate_schema().unwrap(), SchemaReport::valid());

        manager
            .execute_with_retry("DROP TABLE devices", &[], StatementKind::Write, None)
            .unwrap();
        assert_eq!(manager.validate_schema().unwrap(), SchemaReport::valid());
    }

    #[test]
    fn empty_database_reports_everything_missing() {
        let dir = TempDir::new().unwrap();
        let report = sqlite(&dir).validate_schema().unwrap();
        assert_eq!(
            report.missing,
            vec![
                "table:devices",
                "table:events",
                "table:metrics",
                "view:latest_metrics"
            ]
        );
    }

    #[test]
    fn round_trips_rows_through_sqlite() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite(&dir);
        manager.apply_schema().unwrap();

        let inserted = manager
            .execute_with_retry(
                "INSERT INTO events (source, severity, message, created_at) VALUES (?, ?, ?, ?)",
                &[
                    "router".into(),
                    "warning".into(),
                    "wan link flapped".into(),
                    "2024-05-06T10:00:00Z".into(),
                ],
                StatementKind::Write,
                None,
            )
            .unwrap();
        assert_eq!(inserted.rows_affected, 1);

        let rows = manager
            .execute_with_retry("SELECT source, severity FROM events", &[], StatementKind::Read, None)
            .unwrap()
            .rows;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["source"], json!("router"));
    }

    #[test]
    fn real_lock_contention_is_retried() {
        let dir = TempDir::new().unwrap();
        let manager = DatabaseManager::sqlite(
            dir.path().join("dash.db"),
            PoolConfig {
                max_connections: 2,
                acquire_timeout: Duration::from_millis(10),
            },
            RetryPolicy {
                max_retries: 6,
                base_delay: Duration::from_millis(20),
            },
        );
        manager.apply_schema().unwrap();

        // Hold the write lock on a second pooled connection for a while.
        let blocker = manager.pool().get_connection().unwrap();
        let result = std::thread::scope(|scope| {
            let mut blocker = blocker;
            blocker
                .execute_batch(
                    "BEGIN IMMEDIATE; INSERT INTO devices (mac, first_seen, last_seen) VALUES ('aa', 'x', 'x');",
                )
                .unwrap();

            let writer = scope.spawn(|| {
                manager.execute_with_retry(
                    "INSERT INTO devices (mac, first_seen, last_seen) VALUES ('bb', 'y', 'y')",
                    &[],
                    StatementKind::Write,
                    None,
                )
            });

            std::thread::sleep(Duration::from_millis(120));
            blocker.commit().unwrap();
            drop(blocker);
            writer.join().unwrap()
        });
        assert_eq!(result.unwrap().rows_affected, 1);

        let count = manager
            .execute_with_retry("SELECT COUNT(*) AS n FROM devices", &[], StatementKind::Read, None)
            .unwrap();
        assert_eq!(count.rows[0]["n"], json!(2));
    }
}
