//! Frame analysis pipeline
//!
//! frame -> JPEG -> vision model -> reply parser -> normalizer
//!
//! Model failures never surface from `analyze`: the live feed always gets a
//! safe, success-shaped result so it does not stall on a flaky model call.
//! There is no retry. A bounded retry with jitter belongs in `describe_frame`.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::constants::REPORT_DELIMITER;
use crate::frames::{Frame, jpeg_data_url};
use crate::models::ThreatAnalysisResult;
use crate::services::metrics::ApiCallCounter;
use crate::services::normalizer::{Attachments, normalize};
use crate::services::parser::parse_model_reply;
use crate::services::vision::{InlineImage, ModelError, VisionModel};

pub const UNAVAILABLE_DESCRIPTION: &str = "AI analysis unavailable - API key not configured";
pub const CALL_FAILED_DESCRIPTION: &str = "Analysis temporarily unavailable";

fn analysis_prompt() -> String {
    format!(
        r#"You are a security camera monitoring assistant. Analyze this camera frame for potential security threats.

Respond in exactly two parts.

PART 1: One or two plain sentences describing what is happening in the frame, written for a guard watching the live feed.

Then a line containing only:
{delimiter}

PART 2: A single JSON object with these fields:
{{
  "threat_detected": true or false,
  "threat_level": "safe" | "warning" | "danger",
  "description": "technical description of the scene for the incident record",
  "confidence": number between 0.0 and 1.0,
  "details": ["specific observation", "..."],
  "objects_detected": ["person", "vehicle", "..."],
  "people_count": integer,
  "recommended_action": "short instruction for security staff"
}}

Threat levels:
- safe: normal activity, no concern
- warning: suspicious behavior, loitering, unusual presence, obscured faces
- danger: weapons, violence, forced entry, fire, medical emergency

Be factual. Do not speculate beyond what is visible. Output nothing after the JSON object."#,
        delimiter = REPORT_DELIMITER
    )
}

/// Wraps the remote model behind the fixed analysis prompt
pub struct ThreatAnalyzer {
    model: Arc<dyn VisionModel>,
    calls: Arc<ApiCallCounter>,
    timeout: Duration,
    prompt: String,
}

impl ThreatAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>, calls: Arc<ApiCallCounter>, timeout: Duration) -> Self {
        Self {
            model,
            calls,
            timeout,
            prompt: analysis_prompt(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_configured()
    }

    /// Send the frame with the analysis prompt and return the raw reply text
    pub async fn describe_frame(
        &self,
        jpeg: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        if !self.model.is_configured() {
            return Err(ModelError::Unavailable);
        }

        self.calls.increment();
        let images = [InlineImage::jpeg(jpeg)];
        let call = self.model.generate(&self.prompt, &images);

        tokio::select! {
            _ = cancel.cancelled() => Err(ModelError::Call("request cancelled".to_string())),
            reply = tokio::time::timeout(self.timeout, call) => match reply {
                Ok(reply) => reply,
                Err(_) => Err(ModelError::Call(format!("no reply within {:?}", self.timeout))),
            },
        }
    }

    /// Run the full pipeline for one frame
    pub async fn analyze(&self, frame: &Frame, cancel: &CancellationToken) -> ThreatAnalysisResult {
        let started = Instant::now();

        let jpeg = match frame.to_jpeg() {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode frame as JPEG");
                return fallback_result(
                    CALL_FAILED_DESCRIPTION,
                    "Frame could not be encoded for analysis",
                    None,
                );
            }
        };
        let image_data = jpeg_data_url(&jpeg);

        let reply = match self.describe_frame(jpeg, cancel).await {
            Ok(reply) => reply,
            Err(ModelError::Unavailable) => {
                tracing::warn!("vision model not configured; returning default result");
                return fallback_result(
                    UNAVAILABLE_DESCRIPTION,
                    "Configure GOOGLE_GEMINI_API_KEY to enable threat detection",
                    Some(image_data),
                );
            }
            Err(ModelError::Call(e)) => {
                tracing::warn!(error = %e, "vision model call failed; returning default result");
                return fallback_result(
                    CALL_FAILED_DESCRIPTION,
                    "The analysis service did not respond; the frame was not assessed",
                    Some(image_data),
                );
            }
        };

        let parsed = parse_model_reply(&reply);
        let result = normalize(
            &parsed.fields,
            Attachments {
                display: Some(&parsed.display),
                image_data: Some(image_data),
            },
        );

        tracing::info!(
            width = frame.width(),
            height = frame.height(),
            threat_level = %result.threat_level,
            confidence = result.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "frame analyzed"
        );

        result
    }
}

/// Safe default produced when the model could not be consulted
fn fallback_result(
    description: &str,
    detail: &str,
    image_data: Option<String>,
) -> ThreatAnalysisResult {
    normalize(
        &json!({
            "threat_detected": false,
            "threat_level": "safe",
            "confidence": 0.0,
            "details": [detail],
        }),
        Attachments {
            display: Some(description),
            image_data,
        },
    )
}
