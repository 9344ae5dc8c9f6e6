mod config;
mod constants;
mod domain;
mod frames;
mod models;
mod routes;
mod services;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use config::Config;
use services::analyzer::ThreatAnalyzer;
use services::auth::{IdentityProvider, JwtIdentity, SupabaseIdentity, Unconfigured};
use services::detections::DetectionService;
use services::gate::ConfidenceGate;
use services::metrics::ApiCallCounter;
use services::rate_limit::{RateLimitConfig, UserRateLimiter};
use services::reports::ReportGenerator;
use services::store::{DetectionStore, MemoryStore, PgStore};
use services::vision::{GeminiClient, VisionModel};

/// Idle rate-limit buckets are swept on this interval
const RATE_LIMIT_SWEEP: Duration = Duration::from_secs(600);

pub struct AppState {
    pub analyzer: ThreatAnalyzer,
    pub reports: ReportGenerator,
    pub detections: DetectionService,
    pub identity: Arc<dyn IdentityProvider>,
    pub rate_limiter: UserRateLimiter,
    pub calls: Arc<ApiCallCounter>,
}

impl AppState {
    pub fn new(
        model: Arc<dyn VisionModel>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DetectionStore>,
        gate: ConfidenceGate,
        rate_limit: RateLimitConfig,
        model_timeout: Duration,
    ) -> Self {
        let calls = Arc::new(ApiCallCounter::new());
        Self {
            analyzer: ThreatAnalyzer::new(model.clone(), calls.clone(), model_timeout),
            reports: ReportGenerator::new(model, calls.clone(), model_timeout),
            detections: DetectionService::new(store, gate),
            identity,
            rate_limiter: UserRateLimiter::new(rate_limit),
            calls,
        }
    }
}

fn identity_provider(config: &Config) -> Arc<dyn IdentityProvider> {
    if let Some(secret) = &config.supabase_jwt_secret {
        tracing::info!("verifying access tokens locally (HS256)");
        return Arc::new(JwtIdentity::new(secret.as_bytes()));
    }
    match (&config.supabase_url, &config.supabase_key) {
        (Some(url), Some(key)) => {
            tracing::info!(url = %url, "verifying access tokens against identity provider");
            Arc::new(SupabaseIdentity::new(url, key))
        }
        _ => {
            tracing::warn!("no identity provider configured; detection endpoints will refuse requests");
            Arc::new(Unconfigured)
        }
    }
}

async fn detection_store(config: &Config) -> Result<Arc<dyn DetectionStore>, sqlx::Error> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set; detections are kept in memory only");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("connected to database, migrations applied");

    Ok(Arc::new(PgStore::new(pool)))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // Credentials rule out wildcard methods/headers, so list them
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("watcher=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let mut gemini = GeminiClient::new(
        config.gemini_api_key.as_deref(),
        &config.gemini_model,
        config.model_timeout,
    );
    if let Some(base) = &config.gemini_api_base {
        gemini = gemini.with_api_base(base);
    }
    if !gemini.is_configured() {
        tracing::warn!("GOOGLE_GEMINI_API_KEY not set; frames will get default safe results");
    }

    let state = Arc::new(AppState::new(
        Arc::new(gemini),
        identity_provider(&config),
        detection_store(&config).await?,
        config.gate.clone(),
        config.rate_limit,
        config.model_timeout,
    ));

    let gate = state.detections.gate();
    tracing::info!(
        min_confidence = gate.min_confidence,
        levels = ?gate.levels,
        "confidence gate configured"
    );

    // Keep the rate limiter from growing without bound
    let sweeper_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_SWEEP);
        loop {
            interval.tick().await;
            sweeper_state.rate_limiter.cleanup(RATE_LIMIT_SWEEP);
        }
    });

    let app = routes::build_routes()
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
