//! # Database Persistence Layer
//!
//! Optional Postgres persistence for entitlements via SQLx.
//!
//! When `DATABASE_URL` is set, every entitlement mutation is written through
//! to the `course_entitlements` table and the in-memory store is hydrated
//! from it on startup. When absent, the API runs in-memory only, seeded from
//! the dataset file.
//!
//! Enrollments, course runs and refunds belong to the LMS and are not
//! persisted here.

pub mod entitlements;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 Entitlement changes will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
