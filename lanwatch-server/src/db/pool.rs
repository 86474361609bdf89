//! Connection pool for the embedded database
//!
//! SQLite allows one writer at a time, so the pool mostly exists to avoid
//! reopening files and to give every connection the same concurrency setup:
//! WAL journal, a busy timeout, and foreign keys.
//!
//! Acquisition never waits on other callers. When all `max_connections` are
//! checked out, the caller gets an overflow connection that is closed on
//! release instead of joining the pool.
//!
//! The bookkeeping mutex is held only to pop/push/mark, never across I/O.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::connection::{ConnectionFactory, DbConnection};
use super::error::DbError;

/// Default maximum connections for the pool.
/// Kept low for a single-machine dashboard.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Default busy timeout handed to SQLite.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: usize,
    /// How long a connection waits on another connection's lock
    /// (`PRAGMA busy_timeout`). Not a wait on the pool itself.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// Snapshot of pool occupancy for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
    pub max_connections: usize,
    pub created_total: u64,
    pub overflow_total: u64,
}

struct Slot<C> {
    id: u64,
    conn: C,
}

struct PoolState<C> {
    /// Used as a stack.
    idle: Vec<Slot<C>>,
    in_use: HashSet<u64>,
}

enum Checkout<C> {
    Reuse(Slot<C>),
    Open(u64),
    Overflow,
}

pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Connection>>,
    next_id: AtomicU64,
    created_total: AtomicU64,
    overflow_total: AtomicU64,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let config = PoolConfig {
            max_connections: config.max_connections.max(1),
            ..config
        };
        Self {
            factory,
            config,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.max_connections),
                in_use: HashSet::new(),
            }),
            next_id: AtomicU64::new(1),
            created_total: AtomicU64::new(0),
            overflow_total: AtomicU64::new(0),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Check out a connection. It returns to the pool when the guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if a new connection had to be opened
    /// and could not be opened or configured (a file that is not a database
    /// only fails at the first pragma). A lock held by another connection
    /// while switching to WAL stays [`DbError::Locked`].
    pub fn get_connection(&self) -> Result<PooledConnection<'_, F>, DbError> {
        let checkout = {
            let mut state = self.state.lock();
            if let Some(slot) = state.idle.pop() {
                state.in_use.insert(slot.id);
                Checkout::Reuse(slot)
            } else if state.in_use.len() < self.config.max_connections {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                state.in_use.insert(id);
                Checkout::Open(id)
            } else {
                Checkout::Overflow
            }
        };

        match checkout {
            Checkout::Reuse(slot) => Ok(PooledConnection::new(self, slot, false)),
            Checkout::Open(id) => match self.open(id) {
                Ok(slot) => {
                    tracing::debug!(conn_id = id, "opened pooled connection");
                    Ok(PooledConnection::new(self, slot, false))
                }
                Err(e) => {
                    self.state.lock().in_use.remove(&id);
                    Err(e)
                }
            },
            Checkout::Overflow => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let slot = self.open(id)?;
                self.overflow_total.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    conn_id = id,
                    max_connections = self.config.max_connections,
                    "pool exhausted, using overflow connection"
                );
                Ok(PooledConnection::new(self, slot, true))
            }
        }
    }

    /// Close every idle connection and forget checked-out ones.
    ///
    /// Connections currently checked out stay usable; they are handled like
    /// any other release when their guard drops.
    pub fn close_all(&self) {
        let idle = {
            let mut state = self.state.lock();
            state.in_use.clear();
            std::mem::take(&mut state.idle)
        };
        let closed = idle.len();
        drop(idle);
        tracing::info!(closed, "closed idle database connections");
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            max_connections: self.config.max_connections,
            created_total: self.created_total.load(Ordering::Relaxed),
            overflow_total: self.overflow_total.load(Ordering::Relaxed),
        }
    }

    fn open(&self, id: u64) -> Result<Slot<F::Connection>, DbError> {
        let mut conn = self.factory.connect()?;
        self.configure(&mut conn).map_err(|e| {
            if e.is_locked() {
                e
            } else {
                DbError::connection(self.factory.describe(), e)
            }
        })?;
        self.created_total.fetch_add(1, Ordering::Relaxed);
        Ok(Slot { id, conn })
    }

    fn configure(&self, conn: &mut F::Connection) -> Result<(), DbError> {
        conn.pragma("journal_mode", "WAL")?;
        conn.pragma(
            "busy_timeout",
            &self.config.acquire_timeout.as_millis().to_string(),
        )?;
        conn.pragma("foreign_keys", "ON")
    }

    fn release(&self, mut slot: Slot<F::Connection>, overflow: bool) {
        let mut reusable = true;
        if slot.conn.in_transaction() {
            if let Err(e) = slot.conn.rollback() {
                tracing::warn!(conn_id = slot.id, error = %e, "rollback failed while releasing connection");
                reusable = false;
            }
        }

        if overflow {
            return;
        }

        let discarded = {
            let mut state = self.state.lock();
            state.in_use.remove(&slot.id);
            if reusable && state.idle.len() < self.config.max_connections {
                state.idle.push(slot);
                None
            } else {
                Some(slot)
            }
        };
        // Closed outside the lock.
        drop(discarded);
    }

    fn forget(&self, id: u64) {
        self.state.lock().in_use.remove(&id);
    }
}

/// A checked-out connection. Derefs to the underlying connection.
pub struct PooledConnection<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    slot: Option<Slot<F::Connection>>,
    overflow: bool,
}

impl<'a, F: ConnectionFactory> PooledConnection<'a, F> {
    fn new(pool: &'a ConnectionPool<F>, slot: Slot<F::Connection>, overflow: bool) -> Self {
        Self {
            pool,
            slot: Some(slot),
            overflow,
        }
    }

    /// Identity of the physical connection.
    pub fn id(&self) -> u64 {
        self.slot.as_ref().map(|s| s.id).unwrap_or_default()
    }

    pub fn is_overflow(&self) -> bool {
        self.overflow
    }

    /// Close the physical connection instead of returning it to the pool.
    pub fn close(mut self) {
        if let Some(slot) = self.slot.take() {
            if !self.overflow {
                self.pool.forget(slot.id);
            }
            tracing::debug!(conn_id = slot.id, "closed connection on request");
        }
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<'_, F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        &self
            .slot
            .as_ref()
            .expect("pooled connection used after release")
            .conn
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .slot
            .as_mut()
            .expect("pooled connection used after release")
            .conn
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<'_, F> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot, self.overflow);
        }
    }
}
