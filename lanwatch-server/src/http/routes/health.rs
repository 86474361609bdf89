//! Health check endpoint
//!
//! Not rate limited, so monitors keep working while clients are throttled.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use super::with_db;
use crate::db::{PoolStatus, SchemaReport};
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: &'static str,
    pub version: &'static str,
    pub schema: SchemaReport,
    pub pool: PoolStatus,
}

/// GET /health
///
/// 200 when the schema is complete, 503 when it is not or the database
/// cannot be reached.
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let schema = match with_db(&state, |db| db.validate_schema()).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(error = ?e, "health check could not validate schema");
            SchemaReport {
                valid: false,
                missing: Vec::new(),
            }
        }
    };

    let (code, status) = if schema.valid {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            schema,
            pool: state.db.pool_status(),
        }),
    )
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseManager, PoolConfig, RetryPolicy};
    use lanwatch_core::RateLimitRule;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> Arc<AppState> {
        let db = DatabaseManager::sqlite(
            dir.path().join("health.db"),
            PoolConfig::default(),
            RetryPolicy::default(),
        );
        Arc::new(AppState::new(db, RateLimitRule::per_minute(60)))
    }

    #[tokio::test]
    async fn degraded_until_schema_applied() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let (code, Json(body)) = health(State(Arc::clone(&state))).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert!(body.schema.missing.contains(&"view:latest_metrics".to_string()));

        state.db.apply_schema().unwrap();
        let (code, Json(body)) = health(State(state)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert!(body.schema.missing.is_empty());
        assert_eq!(body.pool.in_use, 0);
    }
}
