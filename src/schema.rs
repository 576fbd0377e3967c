//! Database schema management for the telemetry sink.
//!
//! Ensures the health-score table and its indexes exist before the first
//! write. Applied once on startup from `main.rs` when a database is configured.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the `plant_health` table and indexes (idempotent).
///
/// One row per plant per analysis run; the aggregate score is stored under
/// the plant name `_overall`. Safe to call on every startup.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plant_health (
            id               BIGSERIAL PRIMARY KEY,
            recorded_at      TIMESTAMPTZ NOT NULL,
            plant_name       TEXT        NOT NULL,
            growth_stage     TEXT,
            health_score     INTEGER     NOT NULL,
            days_to_harvest  INTEGER
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_plant_health_plant_time
            ON plant_health (plant_name, recorded_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
