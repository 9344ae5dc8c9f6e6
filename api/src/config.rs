//! Runtime configuration read from environment variables

use std::env;
use std::time::Duration;

use crate::constants::MAX_UPLOAD_SIZE;
use crate::models::ThreatLevel;
use crate::services::gate::ConfidenceGate;
use crate::services::rate_limit::RateLimitConfig;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEV_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_base: Option<String>,
    pub model_timeout: Duration,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub supabase_jwt_secret: Option<String>,
    pub gate: ConfidenceGate,
    pub rate_limit: RateLimitConfig,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut cors_origins: Vec<String> = DEV_ORIGINS.iter().map(|o| o.to_string()).collect();
        if let Some(frontend) = var("FRONTEND_URL") {
            let frontend = frontend.trim_end_matches('/').to_string();
            if !cors_origins.contains(&frontend) {
                cors_origins.push(frontend);
            }
        }

        let rate_defaults = RateLimitConfig::default();

        Self {
            port: parse_positive(var("PORT")).unwrap_or(DEFAULT_PORT),
            cors_origins,
            gemini_api_key: var("GOOGLE_GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_api_base: var("GEMINI_API_BASE"),
            model_timeout: Duration::from_secs(
                parse_positive(var("MODEL_TIMEOUT_SECS")).unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS),
            ),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_positive(var("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            supabase_url: var("SUPABASE_URL"),
            supabase_key: var("SUPABASE_SERVICE_KEY").or_else(|| var("SUPABASE_ANON_KEY")),
            supabase_jwt_secret: var("SUPABASE_JWT_SECRET"),
            gate: gate_config(
                var("GATE_POLICY").as_deref(),
                var("GATE_MIN_CONFIDENCE").as_deref(),
                var("GATE_LEVELS").as_deref(),
            ),
            rate_limit: RateLimitConfig {
                max_tokens: parse_positive(var("SAVE_RATE_BURST")).unwrap_or(rate_defaults.max_tokens),
                refill_rate: var("SAVE_RATE_PER_SEC")
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .unwrap_or(rate_defaults.refill_rate),
            },
            max_upload_bytes: parse_positive(var("MAX_UPLOAD_BYTES")).unwrap_or(MAX_UPLOAD_SIZE),
        }
    }
}

fn parse_positive<T>(value: Option<String>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    value
        .and_then(|s| s.parse::<T>().ok())
        .filter(|v| *v > T::default())
}

/// `policy=legacy` picks the stricter preset; explicit threshold or level
/// list override whichever preset is in effect.
fn gate_config(policy: Option<&str>, min_confidence: Option<&str>, levels: Option<&str>) -> ConfidenceGate {
    let mut gate = match policy.map(str::to_ascii_lowercase).as_deref() {
        Some("legacy") => ConfidenceGate::legacy(),
        _ => ConfidenceGate::canonical(),
    };

    if let Some(min) = min_confidence
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| (0.0..=1.0).contains(v))
    {
        gate.min_confidence = min;
    }

    if let Some(raw) = levels {
        let parsed: Vec<ThreatLevel> = raw
            .split(',')
            .filter_map(|level| level.parse().ok())
            .collect();
        if !parsed.is_empty() {
            gate.levels = Some(parsed);
        } else if raw.trim().eq_ignore_ascii_case("all") {
            gate.levels = None;
        }
    }

    gate
}
