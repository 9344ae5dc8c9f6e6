//! Report domain - DB queries for generated threat reports

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::models::ThreatReport;

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: String,
    timestamp: String,
    threat_level: String,
    initial_description: String,
    confidence: f64,
    details: Vec<String>,
    detailed_analysis: String,
    recommendations: String,
    video_filename: String,
    video_size_bytes: i64,
    generated_at: DateTime<Utc>,
}

impl From<ReportRow> for ThreatReport {
    fn from(row: ReportRow) -> Self {
        let threat_level = row.threat_level.parse().unwrap_or_default();
        Self {
            id: row.id,
            timestamp: row.timestamp,
            threat_level,
            priority: threat_level.priority().to_string(),
            initial_description: row.initial_description,
            confidence: row.confidence,
            details: row.details,
            detailed_analysis: row.detailed_analysis,
            recommendations: row.recommendations,
            video_filename: row.video_filename,
            video_size_bytes: row.video_size_bytes.max(0) as u64,
            generated_at: row.generated_at,
        }
    }
}

/// Insert a complete report owned by `user_id`
pub async fn insert_report<'e, E>(
    executor: E,
    user_id: &str,
    report: &ThreatReport,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO threat_reports (
            id, user_id, timestamp, threat_level, initial_description, confidence, details,
            detailed_analysis, recommendations, video_filename, video_size_bytes, generated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&report.id)
    .bind(user_id)
    .bind(&report.timestamp)
    .bind(report.threat_level.as_str())
    .bind(&report.initial_description)
    .bind(report.confidence)
    .bind(&report.details)
    .bind(&report.detailed_analysis)
    .bind(&report.recommendations)
    .bind(&report.video_filename)
    .bind(report.video_size_bytes.min(i64::MAX as u64) as i64)
    .bind(report.generated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// A report is only visible to the user it was generated for
pub async fn get_report<'e, E>(
    executor: E,
    user_id: &str,
    report_id: &str,
) -> Result<Option<ThreatReport>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<ReportRow> = sqlx::query_as(
        r#"
        SELECT id, timestamp, threat_level, initial_description, confidence, details,
               detailed_analysis, recommendations, video_filename, video_size_bytes, generated_at
        FROM threat_reports
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(report_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(ThreatReport::from))
}
