//! Multimodal model client (Gemini generateContent over REST)

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::PLACEHOLDER_API_KEY;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    /// No usable API credential; callers must not attempt the call
    #[error("model API key not configured")]
    Unavailable,
    /// The remote call failed, timed out, or was cancelled
    #[error("model call failed: {0}")]
    Call(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ModelError::Call("request timed out".to_string())
        } else {
            ModelError::Call(e.to_string())
        }
    }
}

/// Inline image attached to a model request
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data,
        }
    }
}

/// A remote model that accepts an instruction plus zero or more images and
/// returns free-form text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Whether a usable credential is configured
    fn is_configured(&self) -> bool;

    async fn generate(&self, prompt: &str, images: &[InlineImage]) -> Result<String, ModelError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    api_key: Option<String>,
    model: String,
    api_base: String,
    http: Client,
}

impl GeminiClient {
    pub fn new(api_key: Option<&str>, model: &str, timeout: Duration) -> Self {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != PLACEHOLDER_API_KEY)
            .map(str::to_string);

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            model: model.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            http,
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn build_request(prompt: &str, images: &[InlineImage]) -> GenerateRequest {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        parts.extend(images.iter().map(|img| Part::InlineData {
            inline_data: InlineData {
                mime_type: img.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&img.data),
            },
        }));

        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
        }
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &str, images: &[InlineImage]) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::Unavailable)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        );

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::build_request(prompt, images))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text, "gemini returned an error status");
            return Err(ModelError::Call(format!("model returned {}", status)));
        }

        let body: GenerateResponse = resp.json().await?;
        body.text()
            .ok_or_else(|| ModelError::Call("model returned no text".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

/// Non-text parts (function calls, thought signatures) carry no `text`
#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}
