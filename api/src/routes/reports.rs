//! Incident report endpoints (/api/generate-report, /api/threat-reports/{id})

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::auth::{BearerToken, require_actor};
use crate::AppState;
use crate::models::{ThreatLevel, ThreatReport};
use crate::services::error::{ApiError, LogErr};
use crate::services::reports::{ReportMetadata, parse_details, store_report};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/generate-report", post(generate_report))
        .route("/api/threat-reports/{id}", get(get_report))
}

#[derive(Serialize)]
struct ReportResponse {
    success: bool,
    report: ThreatReport,
}

#[derive(Deserialize)]
struct ReportQuery {
    auth_token: Option<String>,
}

/// POST /api/generate-report
/// Accepts multipart form data with:
/// - "video" file field (read for its size and filename only)
/// - threat_level, description, confidence, timestamp, details text fields
/// - auth_token (or an Authorization: Bearer header)
async fn generate_report(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
    mut multipart: Multipart,
) -> Result<Json<ReportResponse>, ApiError> {
    let mut video: Option<(String, u64)> = None;
    let mut meta = ReportMetadata::default();
    let mut auth_token: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .log_status("Multipart field error", StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "video" {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| "video.webm".to_string());
            let bytes = field
                .bytes()
                .await
                .log_status("Failed to read video upload", StatusCode::BAD_REQUEST)?;
            video = Some((filename, bytes.len() as u64));
            continue;
        }

        let value = field
            .text()
            .await
            .log_status("Failed to read form field", StatusCode::BAD_REQUEST)?;

        match name.as_str() {
            "threat_level" => meta.threat_level = value.parse::<ThreatLevel>().unwrap_or_default(),
            "description" => meta.description = value.trim().to_string(),
            "confidence" => {
                meta.confidence = value
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|c| c.is_finite())
                    .map(|c| c.clamp(0.0, 1.0))
                    .unwrap_or(0.0)
            }
            "timestamp" => meta.timestamp = value.trim().to_string(),
            "details" => meta.details = parse_details(&value),
            "auth_token" => auth_token = Some(value),
            _ => {}
        }
    }

    let actor = require_actor(&state, auth_token.as_deref(), &bearer).await?;

    let (video_filename, video_size) =
        video.ok_or_else(|| ApiError::BadRequest("Missing video upload".to_string()))?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let mut report = state
        .reports
        .generate(video_size, &video_filename, meta, &cancel)
        .await?;

    store_report(state.detections.store().as_ref(), actor.user_id(), &mut report).await?;

    Ok(Json(ReportResponse {
        success: true,
        report,
    }))
}

/// GET /api/threat-reports/{id}?auth_token= - only the owner sees a report
async fn get_report(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
    Path(report_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportResponse>, ApiError> {
    let actor = require_actor(&state, query.auth_token.as_deref(), &bearer).await?;

    let report = state
        .detections
        .store()
        .get_report(actor.user_id(), &report_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Report not found".to_string()))?;

    Ok(Json(ReportResponse {
        success: true,
        report,
    }))
}
