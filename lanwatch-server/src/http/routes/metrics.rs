//! Metric sample endpoints
//!
//! Samples are a bounded, slowly growing set, so plain offset pagination
//! is good enough here.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use lanwatch_core::{OffsetPaginator, OffsetParams, Row, SqlValue};
use serde::{Deserialize, Serialize};

use super::{non_empty, with_db};
use crate::db::{DbConnection, StatementKind};
use crate::http::error::ApiError;
use crate::state::AppState;

/// Query parameters for GET /api/metrics
#[derive(Debug, Default, Deserialize)]
pub struct ListMetricsParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub name: Option<String>,
}

/// Offset-paginated response
#[derive(Debug, Serialize)]
pub struct MetricsPage {
    pub items: Vec<Row>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
    pub has_prev: bool,
    pub has_next: bool,
}

/// GET /api/metrics - samples, newest first
async fn list_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListMetricsParams>,
) -> Result<Json<MetricsPage>, ApiError> {
    let pagination = OffsetPaginator::from(OffsetParams {
        page: params.page,
        per_page: params.per_page,
    });

    let (filter, filter_params) = match non_empty(params.name.as_deref()) {
        Some(name) => (" WHERE name = ?", vec![SqlValue::from(name)]),
        None => ("", Vec::new()),
    };
    let count_sql = format!("SELECT COUNT(*) AS total FROM metrics{filter}");
    let page_sql = format!(
        "SELECT id, name, value, device_mac, recorded_at FROM metrics{filter} \
         ORDER BY recorded_at DESC, id DESC LIMIT ? OFFSET ?"
    );

    let (total, items) = with_db(&state, move |db| {
        db.with_retry(StatementKind::Read, None, |conn| {
            let total = conn
                .query(&count_sql, &filter_params)?
                .first()
                .and_then(|row| row.get("total"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);

            let mut page_params = filter_params.clone();
            page_params.push(SqlValue::Integer(i64::from(pagination.limit())));
            page_params.push(SqlValue::Integer(
                i64::try_from(pagination.offset()).unwrap_or(i64::MAX),
            ));
            let items = conn.query(&page_sql, &page_params)?;
            Ok((total, items))
        })
    })
    .await?;

    let meta = pagination.meta(total);
    Ok(Json(MetricsPage {
        items,
        total,
        page: pagination.page,
        per_page: pagination.per_page,
        total_pages: pagination.total_pages(total),
        has_prev: meta.has_prev,
        has_next: meta.has_next,
    }))
}

/// GET /api/metrics/latest - most recent sample per metric name
async fn latest_metrics(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Row>>, ApiError> {
    let rows = with_db(&state, |db| {
        db.execute_with_retry(
            "SELECT name, value, device_mac, recorded_at FROM latest_metrics ORDER BY name",
            &[],
            StatementKind::Read,
            None,
        )
    })
    .await?
    .rows;
    Ok(Json(rows))
}

/// Metric routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/metrics", get(list_metrics))
        .route("/api/metrics/latest", get(latest_metrics))
}
