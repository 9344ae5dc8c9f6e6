//! Service banner and health check

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

#[derive(Serialize)]
struct Banner {
    message: &'static str,
    version: &'static str,
    status: &'static str,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    gemini_api_configured: bool,
    api_calls: u64,
}

async fn root() -> Json<Banner> {
    Json(Banner {
        message: "Watcher Security System API",
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        gemini_api_configured: state.analyzer.is_configured(),
        api_calls: state.calls.get(),
    })
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::{read_json, state_with_model};
    use crate::services::analyzer::tests::ScriptedModel;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_model_configuration() {
        let (app, _) = state_with_model(ScriptedModel::unconfigured());
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = read_json(resp).await;
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["gemini_api_configured"], json!(false));
        assert_eq!(body["api_calls"], json!(0));
    }

    #[tokio::test]
    async fn banner_is_operational() {
        let (app, _) = state_with_model(ScriptedModel::unconfigured());
        let resp = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(read_json(resp).await["status"], json!("operational"));
    }
}
