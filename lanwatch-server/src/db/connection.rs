//! Connection contract and the rusqlite implementation
//!
//! The pool and manager only talk to [`DbConnection`], so their retry and
//! reuse logic can be exercised against scripted connections in tests.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lanwatch_core::{Row, SqlValue};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use serde_json::Value;

use super::error::DbError;

/// Rows and change count produced by one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub rows_affected: usize,
}

/// One physical database connection.
pub trait DbConnection: Send {
    /// Run a single statement. Statements that produce columns return their
    /// rows; others return the number of changed rows.
    fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DbError>;

    /// Number of changed rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError> {
        Ok(self.run(sql, params)?.rows_affected)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        Ok(self.run(sql, params)?.rows)
    }

    /// Run several `;`-separated statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError>;

    /// `PRAGMA name = value`
    fn pragma(&mut self, name: &str, value: &str) -> Result<(), DbError>;

    /// Commit an explicit transaction. No-op in autocommit mode.
    fn commit(&mut self) -> Result<(), DbError>;

    /// Roll back an explicit transaction. No-op in autocommit mode.
    fn rollback(&mut self) -> Result<(), DbError>;

    fn in_transaction(&self) -> bool;
}

/// Opens new connections for the pool.
pub trait ConnectionFactory: Send + Sync {
    type Connection: DbConnection;

    fn connect(&self) -> Result<Self::Connection, DbError>;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}

/// Opens SQLite connections to a database file.
#[derive(Debug, Clone)]
pub struct SqliteFactory {
    path: PathBuf,
}

impl SqliteFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConnectionFactory for SqliteFactory {
    type Connection = SqliteConnection;

    fn connect(&self) -> Result<SqliteConnection, DbError> {
        let target = self.path.display().to_string();

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| DbError::connection(&target, e))?;
                tracing::info!(dir = %parent.display(), "created database directory");
            }
        }

        let conn = rusqlite::Connection::open(&self.path)
            .map_err(|e| DbError::connection(&target, e))?;
        Ok(SqliteConnection { conn })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A rusqlite connection in autocommit mode.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl DbConnection for SqliteConnection {
    fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let bound = rusqlite::params_from_iter(params.iter().map(to_sqlite));

        if stmt.column_count() == 0 {
            let rows_affected = stmt.execute(bound)?;
            return Ok(QueryResult {
                rows: Vec::new(),
                rows_affected,
            });
        }

        let readonly = stmt.readonly();
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut out = Vec::new();
        let mut rows = stmt.query(bound)?;
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), from_sqlite(row.get_ref(i)?));
            }
            out.push(record);
        }
        drop(rows);
        drop(stmt);

        // INSERT ... RETURNING reports rows and changes
        let rows_affected = if readonly {
            0
        } else {
            self.conn.changes() as usize
        };

        Ok(QueryResult {
            rows: out,
            rows_affected,
        })
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn pragma(&mut self, name: &str, value: &str) -> Result<(), DbError> {
        // Some pragmas (journal_mode) answer with a row, others don't.
        let mut stmt = self.conn.prepare(&format!("PRAGMA {name} = {value}"))?;
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

fn to_sqlite(value: &SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Integer(i) => SqliteValue::Integer(*i),
        SqlValue::Real(f) => SqliteValue::Real(*f),
        SqlValue::Text(s) => SqliteValue::Text(s.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open() -> (TempDir, SqliteConnection) {
        let dir = TempDir::new().unwrap();
        let conn = SqliteFactory::new(dir.path().join("test.db"))
            .connect()
            .unwrap();
        (dir, conn)
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("dash.db");
        SqliteFactory::new(&path).connect().unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn run_returns_rows_or_change_count() {
        let (_dir, mut conn) = open();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .unwrap();

        let inserted = conn
            .run(
                "INSERT INTO t (name, score) VALUES (?, ?)",
                &["router".into(), 0.5.into()],
            )
            .unwrap();
        assert_eq!(inserted.rows_affected, 1);
        assert!(inserted.rows.is_empty());

        let selected = conn.run("SELECT id, name, score FROM t", &[]).unwrap();
        assert_eq!(selected.rows_affected, 0);
        assert_eq!(selected.rows.len(), 1);
        assert_eq!(selected.rows[0]["name"], json!("router"));
        assert_eq!(selected.rows[0]["score"], json!(0.5));
        // column order is preserved
        let keys: Vec<&String> = selected.rows[0].keys().collect();
        assert_eq!(keys, vec!["id", "name", "score"]);

        let changed = conn
            .execute("UPDATE t SET score = ? WHERE name = ?", &[1.5.into(), "router".into()])
            .unwrap();
        assert_eq!(changed, 1);
        let rows = conn.query("SELECT score FROM t", &[]).unwrap();
        assert_eq!(rows[0]["score"], json!(1.5));
    }

    #[test]
    fn returning_reports_rows_and_changes() {
        let (_dir, mut conn) = open();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let result = conn
            .run("INSERT INTO t (name) VALUES (?) RETURNING id, name", &["a".into()])
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows_affected, 1);
    }

    #[test]
    fn pragma_accepts_row_and_rowless_forms() {
        let (_dir, mut conn) = open();
        conn.pragma("journal_mode", "WAL").unwrap();
        conn.pragma("foreign_keys", "ON").unwrap();
        let mode = conn.run("PRAGMA journal_mode", &[]).unwrap();
        assert_eq!(mode.rows[0]["journal_mode"], json!("wal"));
    }

    #[test]
    fn commit_and_rollback_track_transactions() {
        let (_dir, mut conn) = open();
        conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();

        assert!(!conn.in_transaction());
        conn.commit().unwrap();

        conn.execute_batch("BEGIN; INSERT INTO t VALUES (1);").unwrap();
        assert!(conn.in_transaction());
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());

        let count = conn.run("SELECT COUNT(*) AS n FROM t", &[]).unwrap();
        assert_eq!(count.rows[0]["n"], json!(0));
    }
}
