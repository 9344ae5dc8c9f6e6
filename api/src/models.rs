//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tri-state severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    #[default]
    Safe,
    Warning,
    Danger,
}

impl ThreatLevel {
    pub const ALL: [ThreatLevel; 3] = [ThreatLevel::Safe, ThreatLevel::Warning, ThreatLevel::Danger];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Safe => "safe",
            ThreatLevel::Warning => "warning",
            ThreatLevel::Danger => "danger",
        }
    }

    /// Report priority shown on the dashboard
    pub fn priority(&self) -> &'static str {
        match self {
            ThreatLevel::Safe => "low",
            ThreatLevel::Warning => "medium",
            ThreatLevel::Danger => "high",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(ThreatLevel::Safe),
            "warning" => Ok(ThreatLevel::Warning),
            "danger" => Ok(ThreatLevel::Danger),
            other => Err(format!("unknown threat level: {}", other)),
        }
    }
}

/// Result of analyzing one frame. Every field is always present; see
/// `services::normalizer` for the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAnalysisResult {
    pub threat_detected: bool,
    pub threat_level: ThreatLevel,
    /// Short text for the live display
    pub description: String,
    /// Longer technical description for persisted records
    pub report_description: Option<String>,
    pub confidence: f64,
    pub details: Vec<String>,
    pub objects_detected: Vec<String>,
    pub people_count: u32,
    pub recommended_action: String,
    /// `data:image/jpeg;base64,...` capture of the analyzed frame
    pub image_data: Option<String>,
}

/// A persisted, user-scoped analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatDetectionRecord {
    pub id: String,
    pub user_id: String,
    pub camera_name: String,
    #[serde(flatten)]
    pub analysis: ThreatAnalysisResult,
    pub image_url: Option<String>,
    pub report_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A detection accepted by the gate, ready for insertion
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub user_id: String,
    pub camera_name: String,
    pub analysis: ThreatAnalysisResult,
    pub image_url: Option<String>,
    pub report_id: Option<String>,
}

/// Narrative incident report generated on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub id: String,
    /// Timestamp of the originating detection, as supplied by the caller
    pub timestamp: String,
    pub threat_level: ThreatLevel,
    pub priority: String,
    pub initial_description: String,
    pub confidence: f64,
    pub details: Vec<String>,
    pub detailed_analysis: String,
    pub recommendations: String,
    pub video_filename: String,
    pub video_size_bytes: u64,
    pub generated_at: DateTime<Utc>,
}

/// Per-user detection counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: i64,
    pub safe: i64,
    pub warning: i64,
    pub danger: i64,
    pub today: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_parses_case_insensitively() {
        assert_eq!("Danger".parse::<ThreatLevel>(), Ok(ThreatLevel::Danger));
        assert_eq!(" warning ".parse::<ThreatLevel>(), Ok(ThreatLevel::Warning));
        assert!("critical".parse::<ThreatLevel>().is_err());
    }

    #[test]
    fn detection_record_flattens_analysis_fields() {
        let record = ThreatDetectionRecord {
            id: "abc".into(),
            user_id: "user-1".into(),
            camera_name: "Front Door".into(),
            analysis: ThreatAnalysisResult {
                threat_detected: true,
                threat_level: ThreatLevel::Warning,
                description: "Person at door".into(),
                report_description: None,
                confidence: 0.8,
                details: vec![],
                objects_detected: vec!["person".into()],
                people_count: 1,
                recommended_action: "Review footage".into(),
                image_data: None,
            },
            image_url: None,
            report_id: None,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["threat_level"], "warning");
        assert_eq!(json["camera_name"], "Front Door");
        assert_eq!(json["people_count"], 1);
        assert!(json.get("analysis").is_none());
    }
}
