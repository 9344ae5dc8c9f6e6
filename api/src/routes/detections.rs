//! Detection history endpoints (/api/threat-detections*)

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::auth::{BearerToken, require_actor};
use crate::AppState;
use crate::models::{DetectionStats, ThreatDetectionRecord};
use crate::services::detections::{SaveOutcome, SaveRequest};
use crate::services::error::ApiError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/threat-detections",
            get(list_detections).post(save_detection),
        )
        .route("/api/threat-detections/stats", get(detection_stats))
}

#[derive(Deserialize)]
struct SaveDetectionBody {
    auth_token: Option<String>,
    camera_name: Option<String>,
    #[serde(default)]
    detection: Value,
    image_url: Option<String>,
    report_id: Option<String>,
}

#[derive(Serialize)]
struct SaveDetectionResponse {
    success: bool,
    saved: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    auth_token: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct HistoryResponse {
    success: bool,
    detections: Vec<ThreatDetectionRecord>,
}

#[derive(Serialize)]
struct StatsResponse {
    success: bool,
    #[serde(flatten)]
    stats: DetectionStats,
}

/// POST /api/threat-detections - persist a detection if it clears the gate
async fn save_detection(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
    Json(body): Json<SaveDetectionBody>,
) -> Result<Json<SaveDetectionResponse>, ApiError> {
    let actor = require_actor(&state, body.auth_token.as_deref(), &bearer).await?;

    let outcome = state
        .detections
        .save(
            &actor,
            SaveRequest {
                camera_name: body.camera_name,
                detection: body.detection,
                image_url: body.image_url,
                report_id: body.report_id,
            },
        )
        .await?;

    let response = match outcome {
        SaveOutcome::Saved(id) => SaveDetectionResponse {
            success: true,
            saved: true,
            message: "Threat detection saved",
            id: Some(id),
        },
        SaveOutcome::Skipped(_) => SaveDetectionResponse {
            success: true,
            saved: false,
            message: "Detection not saved (below confidence threshold or excluded level)",
            id: None,
        },
    };

    Ok(Json(response))
}

/// GET /api/threat-detections?auth_token=&limit= - caller's history, newest first
async fn list_detections(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let actor = require_actor(&state, query.auth_token.as_deref(), &bearer).await?;
    let detections = state.detections.query(&actor, query.limit).await?;

    Ok(Json(HistoryResponse {
        success: true,
        detections,
    }))
}

/// GET /api/threat-detections/stats?auth_token= - per-level counts
async fn detection_stats(
    State(state): State<Arc<AppState>>,
    bearer: BearerToken,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let actor = require_actor(&state, query.auth_token.as_deref(), &bearer).await?;
    let stats = state.detections.stats(&actor).await?;

    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}
