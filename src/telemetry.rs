//! Health-score telemetry sink.
//!
//! Each analysis run yields one point per plant plus an `_overall` point.
//! Writes are best effort; callers log failures and move on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::models::{AnalysisReport, DaysToHarvest};

// ---

/// Plant name under which the aggregate score is recorded.
pub const OVERALL: &str = "_overall";

#[derive(Debug, Clone, PartialEq)]
pub struct HealthPoint {
    pub plant_name: String,
    pub growth_stage: Option<String>,
    pub health_score: i32,
    pub days_to_harvest: Option<i32>,
}

/// Flatten a report into telemetry points.
///
/// Only numeric harvest estimates are recorded; free-text ones are dropped.
pub fn health_points(report: &AnalysisReport) -> Vec<HealthPoint> {
    // ---
    let mut points: Vec<HealthPoint> = report
        .plants
        .iter()
        .map(|plant| HealthPoint {
            plant_name: plant.name.clone(),
            growth_stage: Some(plant.observed_stage.clone()),
            health_score: i32::from(plant.health_score),
            days_to_harvest: match &plant.days_to_harvest {
                Some(DaysToHarvest::Days(d)) => Some(*d as i32),
                _ => None,
            },
        })
        .collect();

    if let Some(overall) = report.overall_health {
        points.push(HealthPoint {
            plant_name: OVERALL.to_string(),
            growth_stage: None,
            health_score: i32::from(overall),
            days_to_harvest: None,
        });
    }
    points
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn write_health(&self, points: &[HealthPoint], at: DateTime<Utc>) -> Result<()>;
}

/// Used when no database is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl TelemetrySink for NoopSink {
    async fn write_health(&self, points: &[HealthPoint], _at: DateTime<Utc>) -> Result<()> {
        debug!(points = points.len(), "Telemetry sink disabled, dropping health points");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgTelemetrySink {
    pool: PgPool,
}

impl PgTelemetrySink {
    pub fn new(pool: PgPool) -> Self {
        PgTelemetrySink { pool }
    }
}

#[async_trait]
impl TelemetrySink for PgTelemetrySink {
    async fn write_health(&self, points: &[HealthPoint], at: DateTime<Utc>) -> Result<()> {
        // ---
        let mut tx = self.pool.begin().await?;
        for point in points {
            sqlx::query(
                r#"
                INSERT INTO plant_health
                    (recorded_at, plant_name, growth_stage, health_score, days_to_harvest)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(at)
            .bind(&point.plant_name)
            .bind(point.growth_stage.as_deref())
            .bind(point.health_score)
            .bind(point.days_to_harvest)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert health point for {}", point.plant_name))?;
        }
        tx.commit().await?;

        info!(points = points.len(), "Wrote health scores");
        Ok(())
    }
}
