//! Splits a model reply into its display and structured sections.
//!
//! The reply shape requested by the analysis prompt is
//!
//! ```text
//! <one or two sentences for the live feed>
//! ---REPORT---
//! { ...json fields... }
//! ```
//!
//! Parsing never fails. A reply that cannot be understood degrades to a
//! safe, half-confident "observed but not understood" result.

use serde_json::{Value, json};

use crate::constants::REPORT_DELIMITER;

/// Display text used when the reply carries no display section
pub const GENERIC_DISPLAY_TEXT: &str = "Analysis completed";

/// Detail attached to replies whose structured section did not parse
pub const UNEXPECTED_FORMAT_DETAIL: &str = "Analysis completed but format unexpected";

/// Confidence assigned to replies whose structured section did not parse
pub const UNPARSED_CONFIDENCE: f64 = 0.5;

const FALLBACK_DESCRIPTION_CHARS: usize = 200;

/// A model reply after splitting, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Text for the live display
    pub display: String,
    /// Loosely-typed structured fields
    pub fields: Value,
}

pub fn parse_model_reply(raw: &str) -> ParsedReply {
    let (display, structured) = match raw.split_once(REPORT_DELIMITER) {
        Some((display, structured)) => {
            let display = display.trim();
            let display = if display.is_empty() {
                GENERIC_DISPLAY_TEXT
            } else {
                display
            };
            (display.to_string(), structured)
        }
        None => (GENERIC_DISPLAY_TEXT.to_string(), raw),
    };

    match serde_json::from_str::<Value>(structured_span(structured)) {
        Ok(fields @ Value::Object(_)) => ParsedReply { display, fields },
        Ok(_) | Err(_) => {
            tracing::warn!(
                reply_len = raw.len(),
                "model reply did not contain a structured object"
            );
            unparsed_reply(raw)
        }
    }
}

/// The JSON object inside the structured section.
///
/// The first Markdown code fence (` ```json ` or bare ` ``` `) wins when one
/// is present, then the span from the first `{` to the last `}`. Prose around
/// either is ignored.
pub fn structured_span(text: &str) -> &str {
    let mut inner = text.trim();
    if let Some((_, rest)) = inner.split_once("```") {
        // Language tag, if any, runs up to the first non-letter
        let body = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        inner = body.split_once("```").map_or(body, |(body, _)| body);
    }

    match (inner.find('{'), inner.rfind('}')) {
        (Some(start), Some(end)) if start < end => &inner[start..=end],
        _ => inner.trim(),
    }
}

/// The reply, untouched, becomes the description of a safe result
fn unparsed_reply(raw: &str) -> ParsedReply {
    let description: String = raw.chars().take(FALLBACK_DESCRIPTION_CHARS).collect();
    ParsedReply {
        display: description.clone(),
        fields: json!({
            "threat_detected": false,
            "threat_level": "safe",
            "description": description,
            "confidence": UNPARSED_CONFIDENCE,
            "details": [UNEXPECTED_FORMAT_DETAIL],
        }),
    }
}
