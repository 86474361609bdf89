//! Route handlers organized by resource

pub mod devices;
pub mod events;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::Router;
use serde::Deserialize;

use crate::db::{DatabaseManager, DbError};
use crate::http::error::ApiError;
use crate::state::AppState;

/// Default page size for keyset listings
pub const DEFAULT_LIMIT: u32 = 50;

/// Maximum page size for keyset listings
pub const MAX_LIMIT: u32 = 200;

/// Query parameters shared by keyset listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CursorParams {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl CursorParams {
    pub fn limit(&self) -> usize {
        clamp_limit(self.limit) as usize
    }

    /// Empty `?cursor=` means first page.
    pub fn cursor(&self) -> Option<&str> {
        non_empty(self.cursor.as_deref())
    }
}

/// Treat `?param=` like an absent parameter.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Routes under `/api`, all rate limited.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(events::router())
        .merge(metrics::router())
        .merge(devices::router())
}

/// Run database work on the blocking pool.
///
/// Retry backoff sleeps the calling thread, so it must never run on the
/// async workers.
pub(crate) async fn with_db<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DatabaseManager) -> Result<T, DbError> + Send + 'static,
{
    let db = Arc::clone(&state.db);
    let value = tokio::task::spawn_blocking(move || work(&db)).await??;
    Ok(value)
}
