//! Record store backends
//!
//! `PgStore` is used when DATABASE_URL is set; otherwise detections live in
//! process memory for the lifetime of the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{detections, reports};
use crate::models::{DetectionStats, NewDetection, ThreatDetectionRecord, ThreatLevel, ThreatReport};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("duplicate key: {0}")]
    Duplicate(String),
}

#[async_trait]
pub trait DetectionStore: Send + Sync {
    async fn insert_detection(&self, detection: NewDetection) -> Result<String, StoreError>;

    /// Records owned by `user_id`, newest first
    async fn list_detections(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ThreatDetectionRecord>, StoreError>;

    async fn detection_stats(
        &self,
        user_id: &str,
        day_start: DateTime<Utc>,
    ) -> Result<DetectionStats, StoreError>;

    async fn insert_report(&self, user_id: &str, report: &ThreatReport) -> Result<(), StoreError>;

    /// `None` both for unknown ids and for reports owned by someone else
    async fn get_report(
        &self,
        user_id: &str,
        report_id: &str,
    ) -> Result<Option<ThreatReport>, StoreError>;
}

pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DetectionStore for PgStore {
    async fn insert_detection(&self, detection: NewDetection) -> Result<String, StoreError> {
        Ok(detections::insert_detection(&self.db, &detection).await?)
    }

    async fn list_detections(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ThreatDetectionRecord>, StoreError> {
        Ok(detections::list_detections(&self.db, user_id, limit).await?)
    }

    async fn detection_stats(
        &self,
        user_id: &str,
        day_start: DateTime<Utc>,
    ) -> Result<DetectionStats, StoreError> {
        Ok(detections::detection_stats(&self.db, user_id, day_start).await?)
    }

    async fn insert_report(&self, user_id: &str, report: &ThreatReport) -> Result<(), StoreError> {
        reports::insert_report(&self.db, user_id, report).await.map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(report.id.clone())
            }
            _ => StoreError::Database(e),
        })
    }

    async fn get_report(
        &self,
        user_id: &str,
        report_id: &str,
    ) -> Result<Option<ThreatReport>, StoreError> {
        Ok(reports::get_report(&self.db, user_id, report_id).await?)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    detections: RwLock<Vec<ThreatDetectionRecord>>,
    /// Report id -> (owner, report)
    reports: RwLock<HashMap<String, (String, ThreatReport)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DetectionStore for MemoryStore {
    async fn insert_detection(&self, detection: NewDetection) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = ThreatDetectionRecord {
            id: id.clone(),
            user_id: detection.user_id,
            camera_name: detection.camera_name,
            analysis: detection.analysis,
            image_url: detection.image_url,
            report_id: detection.report_id,
            timestamp: Utc::now(),
        };
        self.detections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(id)
    }

    async fn list_detections(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ThreatDetectionRecord>, StoreError> {
        let guard = self.detections.read().unwrap_or_else(|e| e.into_inner());
        // Insertion order is chronological, so reverse iteration is newest first
        Ok(guard
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn detection_stats(
        &self,
        user_id: &str,
        day_start: DateTime<Utc>,
    ) -> Result<DetectionStats, StoreError> {
        let guard = self.detections.read().unwrap_or_else(|e| e.into_inner());
        let mut stats = DetectionStats::default();
        for record in guard.iter().filter(|r| r.user_id == user_id) {
            stats.total += 1;
            match record.analysis.threat_level {
                ThreatLevel::Safe => stats.safe += 1,
                ThreatLevel::Warning => stats.warning += 1,
                ThreatLevel::Danger => stats.danger += 1,
            }
            if record.timestamp >= day_start {
                stats.today += 1;
            }
        }
        Ok(stats)
    }

    async fn insert_report(&self, user_id: &str, report: &ThreatReport) -> Result<(), StoreError> {
        let mut guard = self.reports.write().unwrap_or_else(|e| e.into_inner());
        if guard.contains_key(&report.id) {
            return Err(StoreError::Duplicate(report.id.clone()));
        }
        guard.insert(report.id.clone(), (user_id.to_string(), report.clone()));
        Ok(())
    }

    async fn get_report(
        &self,
        user_id: &str,
        report_id: &str,
    ) -> Result<Option<ThreatReport>, StoreError> {
        let guard = self.reports.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard
            .get(report_id)
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, report)| report.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::normalizer::{Attachments, normalize};
    use serde_json::json;

    fn detection(user_id: &str, level: &str) -> NewDetection {
        NewDetection {
            user_id: user_id.to_string(),
            camera_name: "Lobby".to_string(),
            analysis: normalize(
                &json!({"threat_level": level, "confidence": 0.9}),
                Attachments::default(),
            ),
            image_url: None,
            report_id: None,
        }
    }

    #[tokio::test]
    async fn memory_store_lists_newest_first_per_user() {
        let store = MemoryStore::new();
        let first = store.insert_detection(detection("alice", "safe")).await.unwrap();
        store.insert_detection(detection("bob", "danger")).await.unwrap();
        let second = store.insert_detection(detection("alice", "warning")).await.unwrap();

        let records = store.list_detections("alice", 50).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);

        let limited = store.list_detections("alice", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, second);
    }

    #[tokio::test]
    async fn memory_store_counts_by_level() {
        let store = MemoryStore::new();
        for level in ["safe", "warning", "warning", "danger"] {
            store.insert_detection(detection("alice", level)).await.unwrap();
        }
        store.insert_detection(detection("bob", "danger")).await.unwrap();

        let stats = store
            .detection_stats("alice", Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(
            stats,
            DetectionStats {
                total: 4,
                safe: 1,
                warning: 2,
                danger: 1,
                today: 4,
            }
        );
    }

    fn report(id: &str) -> ThreatReport {
        ThreatReport {
            id: id.to_string(),
            timestamp: "2025-05-01T03:12:00Z".to_string(),
            threat_level: ThreatLevel::Warning,
            priority: ThreatLevel::Warning.priority().to_string(),
            initial_description: "Person at the gate".to_string(),
            confidence: 0.8,
            details: Vec::new(),
            detailed_analysis: "Narrative".to_string(),
            recommendations: "None".to_string(),
            video_filename: "clip.webm".to_string(),
            video_size_bytes: 10,
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_reports_are_owner_scoped() {
        let store = MemoryStore::new();
        store
            .insert_report("alice", &report("THREAT-20250501031200000"))
            .await
            .unwrap();

        let own = store.get_report("alice", "THREAT-20250501031200000").await.unwrap();
        assert_eq!(own.map(|r| r.initial_description), Some("Person at the gate".to_string()));
        assert!(store.get_report("bob", "THREAT-20250501031200000").await.unwrap().is_none());

        let err = store
            .insert_report("bob", &report("THREAT-20250501031200000"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }
}
