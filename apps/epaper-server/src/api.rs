//! REST handlers for the ePaper server
//!
//! Provides endpoints for:
//! - Edition listing and lookup by location/date
//! - Watermarked PDF download (bearer auth)

use axum::{
    extract::{Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, Utc};
use epaper_core::date::parse_date_input;
use epaper_core::{
    DownloadLog, DownloadOutcome, Edition, EditionFilter, EditionLookup, MemorySink,
};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::extract::RequireUser;
use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "epaper-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct EditionListResponse {
    pub success: bool,
    pub editions: Vec<Edition>,
    pub count: usize,
}

/// Handler: GET /api/editions?stateId=&cityId=&date=&search=
pub async fn handle_list_editions(
    State(state): State<AppState>,
    Query(filter): Query<EditionFilter>,
) -> Json<EditionListResponse> {
    debug!("Listing editions with {:?}", filter);
    let editions = state.editions.editions(&filter).await;
    let count = editions.len();
    Json(EditionListResponse {
        success: true,
        editions,
        count,
    })
}

#[derive(Serialize)]
pub struct EditionLookupResponse {
    pub success: bool,
    /// Card title: edition title, city name, or a generic label
    pub title: String,
    pub lookup: EditionLookup,
}

/// Handler: GET /api/editions/:location_id/:date
///
/// `date` is `YYYY-MM-DD` or `DD-MM-YYYY`. A missing edition is a normal
/// `not_found` lookup, not an HTTP error.
pub async fn handle_edition_lookup(
    State(state): State<AppState>,
    Path((location_id, date)): Path<(String, String)>,
) -> Result<Json<EditionLookupResponse>, ServerError> {
    let date = parse_date_input(&date)
        .ok_or_else(|| ServerError::InvalidRequest(format!("Invalid date '{}'", date)))?;

    let lookup = state.resolver.resolve_edition(&location_id, date).await;
    let title = state
        .resolver
        .display_title(lookup.edition(), &location_id)
        .await;

    Ok(Json(EditionLookupResponse {
        success: true,
        title,
        lookup,
    }))
}

/// Handler: GET /api/download/:edition_id
///
/// Streams the edition's first PDF back with every page stamped with the
/// caller's username and the current local time.
pub async fn handle_download(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(edition_id): Path<String>,
) -> Result<Response, ServerError> {
    let edition = state
        .editions
        .edition(&edition_id)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("Edition '{}'", edition_id)))?;

    let mut sink = MemorySink::new();
    let timestamp = Local::now().fixed_offset();
    match state
        .downloads
        .download(&edition, &user.username, timestamp, &mut sink)
        .await
    {
        DownloadOutcome::Saved(_) => {}
        DownloadOutcome::Unavailable => return Err(ServerError::DownloadUnavailable(edition.id)),
        DownloadOutcome::Failed(e) => return Err(e.into()),
    }

    let output = sink
        .take_last()
        .ok_or_else(|| ServerError::Internal("download produced no output".into()))?;

    state
        .download_logs
        .append(DownloadLog {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            edition_id: edition.id.clone(),
            downloaded_at: Utc::now(),
        })
        .await;

    info!(
        "Served edition {} to {} ({} bytes)",
        edition.id,
        user.username,
        output.bytes.len()
    );

    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", output.filename),
            ),
        ],
        output.bytes,
    )
        .into_response())
}
