//! The one place analysis defaults are applied.
//!
//! Accepts a loosely-typed object (a parsed model reply, or a detection posted
//! by the dashboard) and produces a `ThreatAnalysisResult` with every field
//! present and type-correct.

use serde_json::Value;

use crate::models::{ThreatAnalysisResult, ThreatLevel};

pub const DEFAULT_DESCRIPTION: &str = "No description available";
pub const DEFAULT_RECOMMENDED_ACTION: &str = "Continue monitoring";
pub const DEFAULT_CONFIDENCE: f64 = 0.0;

/// Values attached on top of the structured fields
#[derive(Debug, Default)]
pub struct Attachments<'a> {
    /// Display text from the reply's first section. When present it becomes
    /// `description` and the structured description moves to
    /// `report_description`.
    pub display: Option<&'a str>,
    /// Captured frame as a JPEG data URL
    pub image_data: Option<String>,
}

pub fn normalize(fields: &Value, attach: Attachments<'_>) -> ThreatAnalysisResult {
    let structured_description = string_field(fields, "description");
    let report_description = string_field(fields, "report_description");

    let (description, report_description) = match attach.display {
        Some(display) => (
            display.to_string(),
            report_description.or(structured_description),
        ),
        None => (
            structured_description.unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            report_description,
        ),
    };

    let threat_level = fields
        .get("threat_level")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<ThreatLevel>().ok())
        .unwrap_or_default();

    let threat_detected = match fields.get("threat_detected") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    ThreatAnalysisResult {
        threat_detected,
        threat_level,
        description,
        report_description,
        confidence: confidence_field(fields),
        details: string_list(fields.get("details")),
        objects_detected: dedup(string_list(fields.get("objects_detected"))),
        people_count: people_count_field(fields),
        recommended_action: string_field(fields, "recommended_action")
            .unwrap_or_else(|| DEFAULT_RECOMMENDED_ACTION.to_string()),
        image_data: attach.image_data.or_else(|| string_field(fields, "image_data")),
    }
}

/// Non-empty trimmed string
fn string_field(fields: &Value, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn confidence_field(fields: &Value) -> f64 {
    let raw = match fields.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|v| {
            if s.trim().ends_with('%') { v / 100.0 } else { v }
        }),
        _ => None,
    };

    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

fn people_count_field(fields: &Value) -> u32 {
    match fields.get("people_count") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .map(|v| v.min(u32::MAX as u64) as u32)
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// A list of strings from an array (non-strings stringified) or a lone string
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}
