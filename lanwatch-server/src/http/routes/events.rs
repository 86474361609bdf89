//! Event log endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use lanwatch_core::{KeysetPaginator, Page, Predicate, Row, SortDirection, SqlValue, ValidationError};
use serde::Deserialize;

use super::{clamp_limit, non_empty, with_db};
use crate::db::{DbConnection, StatementKind};
use crate::http::error::ApiError;
use crate::state::AppState;

const SELECT_EVENTS: &str = "SELECT id, source, severity, message, created_at FROM events";

pub const SEVERITIES: &[&str] = &["info", "warning", "critical"];

/// Query parameters for GET /api/events
#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
    pub severity: Option<String>,
    pub source: Option<String>,
    /// `asc` or `desc` (default, newest first)
    pub order: Option<String>,
}

/// Create event request
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub source: String,
    pub severity: String,
    pub message: String,
    /// RFC 3339, defaults to now
    pub created_at: Option<String>,
}

fn validate_severity(severity: &str) -> Result<(), ValidationError> {
    if SEVERITIES.contains(&severity) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat {
            field: "severity",
            reason: "must be one of info, warning, critical",
        })
    }
}

fn parse_order(order: Option<&str>) -> Result<SortDirection, ValidationError> {
    match order {
        None | Some("desc") => Ok(SortDirection::Desc),
        Some("asc") => Ok(SortDirection::Asc),
        Some(_) => Err(ValidationError::InvalidFormat {
            field: "order",
            reason: "must be asc or desc",
        }),
    }
}

fn filters(params: &ListEventsParams) -> Result<Option<Predicate>, ValidationError> {
    let mut predicates = Vec::new();
    if let Some(severity) = non_empty(params.severity.as_deref()) {
        validate_severity(severity)?;
        predicates.push(Predicate::new("severity = ?", vec![severity.into()]));
    }
    if let Some(source) = non_empty(params.source.as_deref()) {
        predicates.push(Predicate::new("source = ?", vec![source.into()]));
    }
    Ok(Predicate::all(predicates))
}

/// GET /api/events - newest first, keyset paginated by id
async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Page<Row>>, ApiError> {
    let paginator = KeysetPaginator::new("id", parse_order(params.order.as_deref())?)?;
    let extra = filters(&params)?;
    let limit = clamp_limit(params.limit) as usize;
    let query = paginator.build_query(
        SELECT_EVENTS,
        non_empty(params.cursor.as_deref()),
        limit,
        extra.as_ref(),
    );

    let rows = with_db(&state, move |db| {
        db.execute_with_retry(&query.sql, &query.params, StatementKind::Read, None)
    })
    .await?
    .rows;

    Ok(Json(paginator.paginate_results(rows, limit)))
}

/// POST /api/events - record an event
async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Row>), ApiError> {
    let source = req.source.trim().to_string();
    if source.is_empty() {
        return Err(ValidationError::Empty { field: "source" }.into());
    }
    if req.message.trim().is_empty() {
        return Err(ValidationError::Empty { field: "message" }.into());
    }
    validate_severity(&req.severity)?;
    let created_at = req
        .created_at
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    let params: Vec<SqlValue> = vec![
        source.into(),
        req.severity.into(),
        req.message.into(),
        created_at.into(),
    ];
    let row = with_db(&state, move |db| {
        db.with_retry(StatementKind::Write, None, |conn| {
            conn.query(
                "INSERT INTO events (source, severity, message, created_at) \
                 VALUES (?, ?, ?, ?) RETURNING id, source, severity, message, created_at",
                &params,
            )
        })
    })
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| ApiError::Internal {
        message: "insert returned no row".into(),
    })?;

    tracing::debug!(id = ?row.get("id"), "event recorded");
    Ok((StatusCode::CREATED, Json(row)))
}

/// Event routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/events", get(list_events).post(create_event))
}
