//! Confidence gate: decides which analyzed frames are worth persisting.

use crate::models::{ThreatAnalysisResult, ThreatLevel};

/// Persistence policy. `levels == None` admits every threat level.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceGate {
    pub min_confidence: f64,
    pub levels: Option<Vec<ThreatLevel>>,
}

impl ConfidenceGate {
    /// Save anything at or above 0.5 confidence, safe frames included
    pub fn canonical() -> Self {
        Self {
            min_confidence: 0.5,
            levels: None,
        }
    }

    /// Earlier policy: only warning/danger at or above 0.7
    pub fn legacy() -> Self {
        Self {
            min_confidence: 0.7,
            levels: Some(vec![ThreatLevel::Warning, ThreatLevel::Danger]),
        }
    }

    pub fn accepts(&self, result: &ThreatAnalysisResult) -> bool {
        let level_allowed = self
            .levels
            .as_ref()
            .is_none_or(|levels| levels.contains(&result.threat_level));

        level_allowed && result.confidence >= self.min_confidence
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::canonical()
    }
}
