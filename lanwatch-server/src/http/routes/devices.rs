//! Device inventory endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use lanwatch_core::{KeysetPaginator, Page, Row, SortDirection, SqlValue, ValidationError};
use serde::Deserialize;

use super::{with_db, CursorParams};
use crate::db::{DbConnection, StatementKind};
use crate::http::error::ApiError;
use crate::state::AppState;

const SELECT_DEVICES: &str =
    "SELECT mac, hostname, ip_address, first_seen, last_seen FROM devices";

/// Device sighting
#[derive(Debug, Default, Deserialize)]
pub struct DeviceSeenRequest {
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
}

/// Lowercase `aa:bb:cc:dd:ee:ff`.
fn normalize_mac(raw: &str) -> Result<String, ValidationError> {
    let mac = raw.trim().to_ascii_lowercase().replace('-', ":");
    if mac.is_empty() {
        return Err(ValidationError::Empty { field: "mac" });
    }
    let octets: Vec<&str> = mac.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "mac",
            reason: "expected six hex octets like aa:bb:cc:dd:ee:ff",
        });
    }
    Ok(mac)
}

/// GET /api/devices - most recently seen first
///
/// Devices seen in the same microsecond share a cursor value; a page
/// boundary between them skips the rest of the tie.
async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CursorParams>,
) -> Result<Json<Page<Row>>, ApiError> {
    let paginator = KeysetPaginator::new("last_seen", SortDirection::Desc)?;
    let limit = params.limit();
    let query = paginator.build_query(SELECT_DEVICES, params.cursor(), limit, None);

    let rows = with_db(&state, move |db| {
        db.execute_with_retry(&query.sql, &query.params, StatementKind::Read, None)
    })
    .await?
    .rows;

    Ok(Json(paginator.paginate_results(rows, limit)))
}

/// GET /api/devices/{mac}
async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
) -> Result<Json<Row>, ApiError> {
    let mac = normalize_mac(&mac)?;
    let key = mac.clone();
    let rows = with_db(&state, move |db| {
        db.execute_with_retry(
            &format!("{SELECT_DEVICES} WHERE mac = ?"),
            &[SqlValue::Text(key)],
            StatementKind::Read,
            None,
        )
    })
    .await?
    .rows;

    rows.into_iter()
        .next()
        .map(Json)
        .ok_or(ApiError::NotFound {
            resource: "device",
            id: mac,
        })
}

/// PUT /api/devices/{mac} - record a sighting, creating the device if new
async fn device_seen(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
    Json(req): Json<DeviceSeenRequest>,
) -> Result<Json<Row>, ApiError> {
    let mac = normalize_mac(&mac)?;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let params: Vec<SqlValue> = vec![
        mac.into(),
        req.hostname.into(),
        req.ip_address.into(),
        now.into(),
    ];

    let rows = with_db(&state, move |db| {
        db.with_retry(StatementKind::Write, None, |conn| {
            conn.query(
                "INSERT INTO devices (mac, hostname, ip_address, first_seen, last_seen) \
                 VALUES (?1, ?2, ?3, ?4, ?4) \
                 ON CONFLICT(mac) DO UPDATE SET \
                     hostname = COALESCE(excluded.hostname, devices.hostname), \
                     ip_address = COALESCE(excluded.ip_address, devices.ip_address), \
                     last_seen = excluded.last_seen \
                 RETURNING mac, hostname, ip_address, first_seen, last_seen",
                &params,
            )
        })
    })
    .await?;

    rows.into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::Internal {
            message: "upsert returned no row".into(),
        })
}

/// Device routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{mac}", get(get_device).put(device_seen))
}
