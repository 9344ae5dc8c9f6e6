//! Frame analysis endpoints (/api/analyze-frame*)

use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::frames::{Frame, decode_base64_frame, decode_frame};
use crate::models::ThreatAnalysisResult;
use crate::services::error::{ApiError, LogErr};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analyze-frame", post(analyze_frame))
        .route("/api/analyze-frame-base64", post(analyze_frame_base64))
}

#[derive(Serialize)]
struct AnalysisResponse {
    success: bool,
    analysis: ThreatAnalysisResult,
}

#[derive(Deserialize)]
struct Base64FrameRequest {
    #[serde(default)]
    image: String,
}

/// POST /api/analyze-frame - multipart upload with a `file` field
async fn analyze_frame(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .log_status("Multipart field error", StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("file") {
            upload = Some(
                field
                    .bytes()
                    .await
                    .log_status("Failed to read frame upload", StatusCode::BAD_REQUEST)?,
            );
        }
    }

    let bytes = upload.ok_or_else(|| ApiError::BadRequest("Missing file upload".to_string()))?;
    let frame = decode_frame(&bytes)?;

    Ok(Json(analyze(&state, frame).await))
}

/// POST /api/analyze-frame-base64 - `{"image": "<base64 or data URL>"}`
async fn analyze_frame_base64(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Base64FrameRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let frame = decode_base64_frame(&req.image).map_err(|e| {
        tracing::debug!(error = %e, "rejected base64 frame");
        ApiError::BadRequest("Invalid image data".to_string())
    })?;

    Ok(Json(analyze(&state, frame).await))
}

async fn analyze(state: &AppState, frame: Frame) -> AnalysisResponse {
    // Dropping the handler future (client gone) cancels the model call
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let analysis = state.analyzer.analyze(&frame, &cancel).await;
    AnalysisResponse {
        success: true,
        analysis,
    }
}

#[cfg(test)]
mod tests {
    use crate::frames::tests::black_png;
    use crate::routes::tests::{multipart_body, multipart_request, read_json, state_with_model};
    use crate::services::analyzer::tests::ScriptedModel;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const DARK_ROOM_REPLY: &str = "A dark empty room\n---REPORT---\n{\"threat_detected\": false, \"threat_level\": \"safe\", \"confidence\": 0.9, \"details\": [], \"objects_detected\": [], \"people_count\": 0}";
    const MALFORMED_REPLY: &str = "Someone near the door\n---REPORT---\n{\"threat_level\": \"warning\", confidence: }";

    fn upload(form: (String, Vec<u8>)) -> Request<Body> {
        multipart_request("/api/analyze-frame", form)
    }

    /// Analyze a frame, post the returned analysis back, then list history
    async fn analyze_save_and_list(app: axum::Router) -> (Value, Value, Vec<Value>) {
        let png = black_png(10, 10);
        let resp = app
            .clone()
            .oneshot(upload(multipart_body(&[("file", Some("frame.png"), &png)])))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let analysis = read_json(resp).await["analysis"].clone();

        let save = json!({
            "auth_token": "token-alice",
            "camera_name": "Living Room",
            "detection": analysis,
        });
        let resp = app
            .clone()
            .oneshot(
                Request::post("/api/threat-detections")
                    .header("content-type", "application/json")
                    .body(Body::from(save.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let saved = read_json(resp).await;

        let resp = app
            .oneshot(
                Request::get("/api/threat-detections")
                    .header("authorization", "Bearer token-alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let history = read_json(resp).await["detections"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        (analysis, saved, history)
    }

    #[tokio::test]
    async fn dark_room_upload_is_classified_safe() {
        let (app, state) = state_with_model(ScriptedModel::replying(DARK_ROOM_REPLY));

        let png = black_png(10, 10);
        let resp = app
            .oneshot(upload(multipart_body(&[("file", Some("frame.png"), &png)])))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = read_json(resp).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["analysis"]["threat_level"], json!("safe"));
        assert_eq!(body["analysis"]["description"], json!("A dark empty room"));
        assert_eq!(body["analysis"]["confidence"], json!(0.9));
        assert!(
            body["analysis"]["image_data"]
                .as_str()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );
        assert_eq!(state.calls.get(), 1);
    }

    #[tokio::test]
    async fn malformed_json_reply_falls_back() {
        let (app, _) = state_with_model(ScriptedModel::replying(MALFORMED_REPLY));

        let png = black_png(10, 10);
        let resp = app
            .oneshot(upload(multipart_body(&[("file", Some("frame.png"), &png)])))
            .await
            .unwrap();
        let body = read_json(resp).await;

        assert_eq!(body["analysis"]["threat_level"], json!("safe"));
        assert_eq!(body["analysis"]["confidence"], json!(0.5));
        assert_eq!(
            body["analysis"]["details"],
            json!(["Analysis completed but format unexpected"])
        );
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected() {
        let (app, state) = state_with_model(ScriptedModel::replying("unused"));

        let resp = app
            .oneshot(upload(multipart_body(&[("file", Some("notes.txt"), b"hello")])))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(resp).await["detail"], json!("Invalid image file"));
        assert_eq!(state.calls.get(), 0);
    }

    #[tokio::test]
    async fn base64_endpoint_accepts_data_url() {
        let (app, _) = state_with_model(ScriptedModel::replying(
            "Quiet hallway\n---REPORT---\n{\"threat_level\": \"safe\", \"confidence\": 0.8}",
        ));

        let encoded = base64::engine::general_purpose::STANDARD.encode(black_png(8, 8));
        let payload = json!({ "image": format!("data:image/png;base64,{}", encoded) });
        let resp = app
            .oneshot(
                Request::post("/api/analyze-frame-base64")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_json(resp).await["analysis"]["description"], json!("Quiet hallway"));
    }

    #[tokio::test]
    async fn base64_endpoint_rejects_garbage() {
        let (app, _) = state_with_model(ScriptedModel::replying("unused"));

        let resp = app
            .oneshot(
                Request::post("/api/analyze-frame-base64")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "image": "data:image/png;base64,aGVsbG8=" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(resp).await["detail"], json!("Invalid image data"));
    }

    #[tokio::test]
    async fn dark_room_analysis_is_saved_once() {
        let (app, _) = state_with_model(ScriptedModel::replying(DARK_ROOM_REPLY));
        let (_, saved, history) = analyze_save_and_list(app).await;

        assert_eq!(saved["saved"], json!(true));
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record["id"], saved["id"]);
        assert_eq!(record["camera_name"], json!("Living Room"));
        assert_eq!(record["threat_level"], json!("safe"));
        assert_eq!(record["description"], json!("A dark empty room"));
        assert_eq!(record["confidence"], json!(0.9));
    }

    #[tokio::test]
    async fn fallback_analysis_sits_on_the_gate_boundary() {
        let (app, _) = state_with_model(ScriptedModel::replying(MALFORMED_REPLY));
        let (analysis, saved, history) = analyze_save_and_list(app).await;

        assert_eq!(analysis["confidence"], json!(0.5));
        assert_eq!(saved["saved"], json!(true));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["threat_level"], json!("safe"));
        assert_eq!(history[0]["confidence"], json!(0.5));
        assert_eq!(
            history[0]["details"],
            json!(["Analysis completed but format unexpected"])
        );
    }
}
