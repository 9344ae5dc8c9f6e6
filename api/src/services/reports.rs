//! Narrative incident reports
//!
//! The uploaded video is opaque here: only its size and filename reach the
//! prompt. A failed model call fails the whole report; nothing partial is
//! returned or stored.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::{ThreatLevel, ThreatReport};
use crate::services::metrics::ApiCallCounter;
use crate::services::store::{DetectionStore, StoreError};
use crate::services::vision::{ModelError, VisionModel};

pub const NO_RECOMMENDATIONS: &str = "See detailed analysis above";

/// Prior detection metadata submitted alongside the video
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportMetadata {
    pub threat_level: ThreatLevel,
    pub description: String,
    pub confidence: f64,
    pub timestamp: String,
    pub details: Vec<String>,
}

/// Details arrive as a JSON-encoded list, a JSON string, or plain text
pub fn parse_details(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Ok(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Ok(Value::String(s)) => vec![s.trim().to_string()],
        _ => vec![raw.to_string()],
    }
}

/// Fresh ids are tried this many times when an id is already taken
const REPORT_ID_ATTEMPTS: usize = 5;

/// `THREAT-<YYYYmmddHHMMSSmmm>` in UTC, millisecond resolution
pub fn report_id(now: DateTime<Utc>) -> String {
    format!("THREAT-{}", now.format("%Y%m%d%H%M%S%3f"))
}

/// Persist `report` for `owner`, moving it to a later id if its id is taken
pub async fn store_report(
    store: &dyn DetectionStore,
    owner: &str,
    report: &mut ThreatReport,
) -> Result<(), StoreError> {
    let mut attempt = 1;
    loop {
        match store.insert_report(owner, report).await {
            Err(StoreError::Duplicate(id)) if attempt < REPORT_ID_ATTEMPTS => {
                tracing::debug!(report_id = %id, attempt, "report id taken, retrying");
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(1)).await;
                report.id = report_id(Utc::now());
            }
            result => return result,
        }
    }
}

/// First paragraph mentioning a recommendation, verbatim; a fixed
/// placeholder otherwise. Callers only see the excerpt, so this can later be
/// replaced by a structured model request.
pub fn extract_recommendations(narrative: &str) -> String {
    narrative
        .split("\n\n")
        .map(str::trim)
        .find(|p| p.to_lowercase().contains("recommendation"))
        .map(str::to_string)
        .unwrap_or_else(|| NO_RECOMMENDATIONS.to_string())
}

fn build_report_prompt(meta: &ReportMetadata, video_filename: &str, video_size: u64) -> String {
    let details = if meta.details.is_empty() {
        "- None recorded".to_string()
    } else {
        meta.details
            .iter()
            .map(|d| format!("- {}", d))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are a security analyst writing an incident report for a monitored premises.

A camera detection was recorded with the following metadata:
- Threat level: {level}
- Priority: {priority}
- Confidence: {confidence:.0}%
- Detected at: {timestamp}
- Initial description: {description}

Observations:
{details}

Video evidence: {filename} ({size} bytes)

Write a professional incident report with these sections, separated by blank lines:
1. Executive summary
2. Timeline of events
3. Threat assessment
4. Recommendations for security personnel
5. Follow-up actions

Base the report only on the information above. Do not invent names, plates, or faces."#,
        level = meta.threat_level.as_str().to_uppercase(),
        priority = meta.threat_level.priority(),
        confidence = meta.confidence * 100.0,
        timestamp = meta.timestamp,
        description = meta.description,
        details = details,
        filename = video_filename,
        size = video_size,
    )
}

pub struct ReportGenerator {
    model: Arc<dyn VisionModel>,
    calls: Arc<ApiCallCounter>,
    timeout: Duration,
}

impl ReportGenerator {
    pub fn new(model: Arc<dyn VisionModel>, calls: Arc<ApiCallCounter>, timeout: Duration) -> Self {
        Self {
            model,
            calls,
            timeout,
        }
    }

    pub async fn generate(
        &self,
        video_size: u64,
        video_filename: &str,
        meta: ReportMetadata,
        cancel: &CancellationToken,
    ) -> Result<ThreatReport, ModelError> {
        if !self.model.is_configured() {
            return Err(ModelError::Unavailable);
        }

        let started = Instant::now();
        let prompt = build_report_prompt(&meta, video_filename, video_size);

        self.calls.increment();
        let narrative = tokio::select! {
            _ = cancel.cancelled() => return Err(ModelError::Call("request cancelled".to_string())),
            reply = tokio::time::timeout(self.timeout, self.model.generate(&prompt, &[])) => match reply {
                Ok(reply) => reply?,
                Err(_) => {
                    return Err(ModelError::Call(format!(
                        "no reply within {:?}",
                        self.timeout
                    )));
                }
            },
        };

        let narrative = narrative.trim().to_string();
        if narrative.is_empty() {
            return Err(ModelError::Call("model returned an empty report".to_string()));
        }

        let now = Utc::now();
        let report = ThreatReport {
            id: report_id(now),
            timestamp: meta.timestamp,
            threat_level: meta.threat_level,
            priority: meta.threat_level.priority().to_string(),
            initial_description: meta.description,
            confidence: meta.confidence,
            details: meta.details,
            recommendations: extract_recommendations(&narrative),
            detailed_analysis: narrative,
            video_filename: video_filename.to_string(),
            video_size_bytes: video_size,
            generated_at: now,
        };

        tracing::info!(
            report_id = %report.id,
            threat_level = %report.threat_level,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "report generated"
        );

        Ok(report)
    }
}
