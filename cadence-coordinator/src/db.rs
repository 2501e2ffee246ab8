use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create job definitions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_definitions (
            id UUID PRIMARY KEY,
            handler VARCHAR(255) NOT NULL,
            executor_key VARCHAR(255) NOT NULL,
            schedule_type VARCHAR(20) NOT NULL,
            schedule_expression TEXT NOT NULL DEFAULT '',
            dispatch_mode VARCHAR(20) NOT NULL DEFAULT 'UNICAST',
            next_execution_time TIMESTAMPTZ,
            last_execution_time TIMESTAMPTZ,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 0,
            parameters JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The scan query filters on both columns
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_definitions_due ON job_definitions(enabled, next_execution_time)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_definitions_executor_key ON job_definitions(executor_key)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
