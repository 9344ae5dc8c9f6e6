//! Detection domain - DB queries for threat detections
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::models::{DetectionStats, NewDetection, ThreatAnalysisResult, ThreatDetectionRecord};

#[derive(Debug, sqlx::FromRow)]
pub struct DetectionRow {
    pub id: String,
    pub user_id: String,
    pub camera_name: String,
    pub threat_detected: bool,
    pub threat_level: String,
    pub description: String,
    pub report_description: Option<String>,
    pub confidence: f64,
    pub details: Vec<String>,
    pub objects_detected: Vec<String>,
    pub people_count: i32,
    pub recommended_action: String,
    pub image_data: Option<String>,
    pub image_url: Option<String>,
    pub report_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<DetectionRow> for ThreatDetectionRecord {
    fn from(row: DetectionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            camera_name: row.camera_name,
            analysis: ThreatAnalysisResult {
                threat_detected: row.threat_detected,
                // Rows are written from the enum; unknown text reads as safe
                threat_level: row.threat_level.parse().unwrap_or_default(),
                description: row.description,
                report_description: row.report_description,
                confidence: row.confidence,
                details: row.details,
                objects_detected: row.objects_detected,
                people_count: row.people_count.max(0) as u32,
                recommended_action: row.recommended_action,
                image_data: row.image_data,
            },
            image_url: row.image_url,
            report_id: row.report_id,
            timestamp: row.timestamp,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InsertedDetection {
    id: String,
}

/// Insert a detection; the timestamp is assigned by the database
pub async fn insert_detection<'e, E>(executor: E, detection: &NewDetection) -> Result<String, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let a = &detection.analysis;
    let result: InsertedDetection = sqlx::query_as(
        r#"
        INSERT INTO threat_detections (
            user_id, camera_name, threat_detected, threat_level, description,
            report_description, confidence, details, objects_detected, people_count,
            recommended_action, image_data, image_url, report_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id::text AS id
        "#,
    )
    .bind(&detection.user_id)
    .bind(&detection.camera_name)
    .bind(a.threat_detected)
    .bind(a.threat_level.as_str())
    .bind(&a.description)
    .bind(&a.report_description)
    .bind(a.confidence)
    .bind(&a.details)
    .bind(&a.objects_detected)
    .bind(a.people_count.min(i32::MAX as u32) as i32)
    .bind(&a.recommended_action)
    .bind(&a.image_data)
    .bind(&detection.image_url)
    .bind(&detection.report_id)
    .fetch_one(executor)
    .await?;

    Ok(result.id)
}

/// A user's detections, newest first
pub async fn list_detections<'e, E>(
    executor: E,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ThreatDetectionRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<DetectionRow> = sqlx::query_as(
        r#"
        SELECT id::text AS id, user_id, camera_name, threat_detected, threat_level,
               description, report_description, confidence, details, objects_detected,
               people_count, recommended_action, image_data, image_url, report_id, timestamp
        FROM threat_detections
        WHERE user_id = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(ThreatDetectionRecord::from).collect())
}

/// Per-level counts for one user; `today` is relative to `day_start`
pub async fn detection_stats<'e, E>(
    executor: E,
    user_id: &str,
    day_start: DateTime<Utc>,
) -> Result<DetectionStats, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (total, safe, warning, danger, today): (i64, i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COUNT(*) FILTER (WHERE threat_level = 'safe'),
               COUNT(*) FILTER (WHERE threat_level = 'warning'),
               COUNT(*) FILTER (WHERE threat_level = 'danger'),
               COUNT(*) FILTER (WHERE timestamp >= $2)
        FROM threat_detections
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(day_start)
    .fetch_one(executor)
    .await?;

    Ok(DetectionStats {
        total,
        safe,
        warning,
        danger,
        today,
    })
}
