//! Detection persistence: gate, enrich, store, and user-scoped history

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::constants::{DEFAULT_CAMERA_NAME, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::models::{DetectionStats, NewDetection, ThreatAnalysisResult, ThreatDetectionRecord};
use crate::services::auth::Actor;
use crate::services::gate::ConfidenceGate;
use crate::services::normalizer::{Attachments, DEFAULT_RECOMMENDED_ACTION, normalize};
use crate::services::store::{DetectionStore, StoreError};

/// A detection posted by the dashboard, before normalization
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    pub camera_name: Option<String>,
    pub detection: Value,
    pub image_url: Option<String>,
    pub report_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(String),
    /// Below the gate; returned to the caller but not persisted
    Skipped(ThreatAnalysisResult),
}

pub struct DetectionService {
    store: Arc<dyn DetectionStore>,
    gate: ConfidenceGate,
}

impl DetectionService {
    pub fn new(store: Arc<dyn DetectionStore>, gate: ConfidenceGate) -> Self {
        Self { store, gate }
    }

    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    pub fn store(&self) -> &Arc<dyn DetectionStore> {
        &self.store
    }

    pub async fn save(&self, actor: &Actor, req: SaveRequest) -> Result<SaveOutcome, StoreError> {
        let analysis = normalize(&req.detection, Attachments::default());

        if !self.gate.accepts(&analysis) {
            tracing::debug!(
                user_id = %actor,
                threat_level = %analysis.threat_level,
                confidence = analysis.confidence,
                "detection below gate, not saved"
            );
            return Ok(SaveOutcome::Skipped(analysis));
        }

        let camera_name = req
            .camera_name
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CAMERA_NAME.to_string());

        let detection = NewDetection {
            user_id: actor.user_id().to_string(),
            camera_name,
            analysis: enrich(analysis),
            image_url: non_empty(req.image_url),
            report_id: non_empty(req.report_id),
        };

        let id = self.store.insert_detection(detection).await?;
        tracing::info!(user_id = %actor, detection_id = %id, "detection saved");
        Ok(SaveOutcome::Saved(id))
    }

    /// The actor's own records, newest first
    pub async fn query(
        &self,
        actor: &Actor,
        limit: Option<i64>,
    ) -> Result<Vec<ThreatDetectionRecord>, StoreError> {
        self.store
            .list_detections(actor.user_id(), clamp_limit(limit))
            .await
    }

    pub async fn stats(&self, actor: &Actor) -> Result<DetectionStats, StoreError> {
        self.store
            .detection_stats(actor.user_id(), start_of_day(Utc::now()))
            .await
    }
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Append the derived observations to the persisted detail trail. The
/// placeholder action filled in by normalization is not an observation.
fn enrich(mut analysis: ThreatAnalysisResult) -> ThreatAnalysisResult {
    if !analysis.objects_detected.is_empty() {
        analysis.details.push(format!(
            "Objects detected: {}",
            analysis.objects_detected.join(", ")
        ));
    }
    if analysis.people_count > 0 {
        analysis
            .details
            .push(format!("People count: {}", analysis.people_count));
    }
    if analysis.recommended_action != DEFAULT_RECOMMENDED_ACTION {
        analysis
            .details
            .push(format!("Recommended action: {}", analysis.recommended_action));
    }
    analysis
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreatLevel;
    use crate::services::auth::tests::actor;
    use crate::services::store::MemoryStore;
    use serde_json::json;

    fn service(gate: ConfidenceGate) -> DetectionService {
        DetectionService::new(Arc::new(MemoryStore::new()), gate)
    }

    fn request(level: &str, confidence: f64) -> SaveRequest {
        SaveRequest {
            camera_name: Some("Back Gate".to_string()),
            detection: json!({
                "threat_detected": level != "safe",
                "threat_level": level,
                "description": "Person near fence",
                "confidence": confidence,
                "details": ["Figure at the fence line"],
                "objects_detected": ["person", "ladder"],
                "people_count": 1,
                "recommended_action": "Dispatch guard",
            }),
            image_url: None,
            report_id: Some("THREAT-20250101120000".to_string()),
        }
    }

    #[tokio::test]
    async fn saved_detection_carries_derived_details() {
        let svc = service(ConfidenceGate::canonical());
        let alice = actor("alice");

        let outcome = svc.save(&alice, request("warning", 0.8)).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));

        let records = svc.query(&alice, None).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.camera_name, "Back Gate");
        assert_eq!(record.report_id.as_deref(), Some("THREAT-20250101120000"));
        assert_eq!(
            record.analysis.details,
            vec![
                "Figure at the fence line",
                "Objects detected: person, ladder",
                "People count: 1",
                "Recommended action: Dispatch guard",
            ]
        );
    }

    #[tokio::test]
    async fn default_action_is_not_recorded_as_a_detail() {
        let svc = service(ConfidenceGate::canonical());
        let alice = actor("alice");
        let mut req = request("warning", 0.8);
        req.detection["recommended_action"] = Value::Null;
        svc.save(&alice, req).await.unwrap();

        let records = svc.query(&alice, None).await.unwrap();
        assert_eq!(records[0].analysis.recommended_action, DEFAULT_RECOMMENDED_ACTION);
        assert!(
            !records[0]
                .analysis
                .details
                .iter()
                .any(|d| d.starts_with("Recommended action"))
        );
    }

    #[tokio::test]
    async fn gate_rejects_low_confidence_without_storing() {
        let svc = service(ConfidenceGate::canonical());
        let alice = actor("alice");

        let outcome = svc.save(&alice, request("danger", 0.49)).await.unwrap();
        match outcome {
            SaveOutcome::Skipped(result) => assert_eq!(result.threat_level, ThreatLevel::Danger),
            other => panic!("expected skip, got {:?}", other),
        }
        assert!(svc.query(&alice, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_gate_skips_safe_frames() {
        let svc = service(ConfidenceGate::legacy());
        let alice = actor("alice");

        let outcome = svc.save(&alice, request("safe", 0.95)).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Skipped(_)));
        let outcome = svc.save(&alice, request("warning", 0.7)).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
    }

    #[tokio::test]
    async fn query_never_crosses_users() {
        let svc = service(ConfidenceGate::canonical());
        let users = [actor("alice"), actor("bob"), actor("carol")];

        for round in 0..7 {
            for (i, user) in users.iter().enumerate() {
                if (round + i) % 2 == 0 {
                    let mut req = request("warning", 0.9);
                    req.camera_name = Some(format!("{}-cam-{}", user, round));
                    svc.save(user, req).await.unwrap();
                }
            }
        }

        for user in &users {
            let records = svc.query(user, Some(100)).await.unwrap();
            assert!(!records.is_empty());
            assert!(records.iter().all(|r| r.user_id == user.user_id()));
            assert!(records.iter().all(|r| r.camera_name.starts_with(user.user_id())));
        }
    }

    #[tokio::test]
    async fn blank_camera_name_uses_default() {
        let svc = service(ConfidenceGate::canonical());
        let alice = actor("alice");
        let mut req = request("safe", 0.9);
        req.camera_name = Some("   ".to_string());
        svc.save(&alice, req).await.unwrap();

        let records = svc.query(&alice, None).await.unwrap();
        assert_eq!(records[0].camera_name, DEFAULT_CAMERA_NAME);
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-3)), 1);
        assert_eq!(clamp_limit(Some(1000)), 100);
        assert_eq!(clamp_limit(Some(20)), 20);
    }

    #[tokio::test]
    async fn stats_count_only_own_detections() {
        let svc = service(ConfidenceGate::canonical());
        let alice = actor("alice");
        let bob = actor("bob");
        svc.save(&alice, request("danger", 0.9)).await.unwrap();
        svc.save(&alice, request("safe", 0.9)).await.unwrap();
        svc.save(&bob, request("warning", 0.9)).await.unwrap();

        let stats = svc.stats(&alice).await.unwrap();
        assert_eq!((stats.total, stats.safe, stats.warning, stats.danger), (2, 1, 0, 1));
        assert_eq!(stats.today, 2);
    }
}
