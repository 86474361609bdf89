//! Dashboard schema and the objects the server requires at startup

use std::collections::BTreeSet;

use serde::Serialize;

/// Tables that must exist before the dashboard reports healthy.
pub const REQUIRED_TABLES: &[&str] = &["events", "metrics", "devices"];

/// Views that must exist before the dashboard reports healthy.
pub const REQUIRED_VIEWS: &[&str] = &["latest_metrics"];

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    severity TEXT NOT NULL CHECK (severity IN ('info', 'warning', 'critical')),
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS devices (
    mac TEXT PRIMARY KEY,
    hostname TEXT,
    ip_address TEXT,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    device_mac TEXT REFERENCES devices(mac) ON DELETE SET NULL,
    recorded_at TEXT NOT NULL
);

CREATE VIEW IF NOT EXISTS latest_metrics AS
    SELECT m.name, m.value, m.device_mac, m.recorded_at
    FROM metrics m
    WHERE m.id = (SELECT MAX(m2.id) FROM metrics m2 WHERE m2.name = m.name);
"#;

pub const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_severity ON events(severity, id);
CREATE INDEX IF NOT EXISTS idx_events_source ON events(source, id);
CREATE INDEX IF NOT EXISTS idx_devices_last_seen ON devices(last_seen);
CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(name, recorded_at);
"#;

/// Named tables and views a database must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContract {
    pub tables: BTreeSet<String>,
    pub views: BTreeSet<String>,
}

impl SchemaContract {
    pub fn new<T, V>(tables: T, views: V) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            views: views.into_iter().map(Into::into).collect(),
        }
    }

    /// The dashboard's own schema.
    pub fn dashboard() -> Self {
        Self::new(REQUIRED_TABLES.iter().copied(), REQUIRED_VIEWS.iter().copied())
    }

    /// Missing objects as `table:<name>` / `view:<name>`, tables first.
    pub fn missing(
        &self,
        existing_tables: &BTreeSet<String>,
        existing_views: &BTreeSet<String>,
    ) -> Vec<String> {
        let tables = self
            .tables
            .difference(existing_tables)
            .map(|t| format!("table:{t}"));
        let views = self
            .views
            .difference(existing_views)
            .map(|v| format!("view:{v}"));
        tables.chain(views).collect()
    }
}

/// Result of a schema check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    pub missing: Vec<String>,
}

impl SchemaReport {
    pub fn valid() -> Self {
        Self {
            valid: true,
            missing: Vec::new(),
        }
    }
}
