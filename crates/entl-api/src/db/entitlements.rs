//! Entitlement persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `course_entitlements`
//! table. Lifecycle rules are enforced in the application layer; the upsert
//! additionally never overwrites a stored `expired_at`.

use chrono::{DateTime, Utc};
use entl_core::{CourseMode, EnrollmentRef, Entitlement};
use sqlx::PgPool;
use uuid::Uuid;

const COLUMNS: &str = "uuid, username, course_uuid, mode, order_number, created, modified, \
                       expired_at, enrollment_course_run, upgrade_deadline";

fn serialize_enrollment(
    enrollment: Option<&EnrollmentRef>,
) -> Result<Option<serde_json::Value>, sqlx::Error> {
    enrollment
        .map(|e| {
            serde_json::to_value(e).map_err(|err| {
                tracing::error!(error = %err, "failed to serialize enrollment reference");
                sqlx::Error::Encode(Box::new(err))
            })
        })
        .transpose()
}

/// Single-statement upsert. A stored `expired_at` is kept over the
/// incoming one, so the stamp cannot be cleared or moved by a write.
const UPSERT_SQL: &str = "INSERT INTO course_entitlements (uuid, username, course_uuid, mode, \
     order_number, created, modified, expired_at, enrollment_course_run, upgrade_deadline)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
     ON CONFLICT (uuid) DO UPDATE SET
        mode = EXCLUDED.mode,
        order_number = EXCLUDED.order_number,
        modified = EXCLUDED.modified,
        expired_at = COALESCE(course_entitlements.expired_at, EXCLUDED.expired_at),
        enrollment_course_run = EXCLUDED.enrollment_course_run,
        upgrade_deadline = EXCLUDED.upgrade_deadline";

/// Insert or update an entitlement row.
///
/// Dataset-seeded entitlements reach the database this way on their first
/// mutation; concurrent first writes of the same record both succeed.
pub async fn upsert(pool: &PgPool, record: &Entitlement) -> Result<(), sqlx::Error> {
    let enrollment = serialize_enrollment(record.enrollment_course_run.as_ref())?;

    sqlx::query(UPSERT_SQL)
        .bind(record.uuid)
        .bind(&record.user)
        .bind(record.course_uuid)
        .bind(record.mode.as_str())
        .bind(&record.order_number)
        .bind(record.created)
        .bind(record.modified)
        .bind(record.expired_at)
        .bind(enrollment)
        .bind(record.upgrade_deadline)
        .execute(pool)
        .await?;

    Ok(())
}

/// Load all entitlements from the database into the in-memory store on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Entitlement>, sqlx::Error> {
    let rows = sqlx::query_as::<_, EntitlementRow>(&format!(
        "SELECT {COLUMNS} FROM course_entitlements ORDER BY created, uuid"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(EntitlementRow::into_record).collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct EntitlementRow {
    uuid: Uuid,
    username: String,
    course_uuid: Uuid,
    mode: String,
    order_number: Option<String>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    expired_at: Option<DateTime<Utc>>,
    enrollment_course_run: Option<serde_json::Value>,
    upgrade_deadline: Option<DateTime<Utc>>,
}

impl EntitlementRow {
    fn into_record(self) -> Entitlement {
        let mode: CourseMode = self.mode.parse().unwrap_or_else(|e| {
            tracing::error!(
                uuid = %self.uuid,
                mode = %self.mode,
                error = %e,
                "unknown course mode in database, defaulting to verified"
            );
            CourseMode::Verified
        });

        let enrollment_course_run = self.enrollment_course_run.and_then(|value| {
            serde_json::from_value::<EnrollmentRef>(value)
                .map_err(|e| {
                    tracing::error!(
                        uuid = %self.uuid,
                        error = %e,
                        "failed to deserialize enrollment reference, treating as unredeemed"
                    );
                })
                .ok()
        });

        Entitlement {
            uuid: self.uuid,
            user: self.username,
            course_uuid: self.course_uuid,
            mode,
            order_number: self.order_number,
            created: self.created,
            modified: self.modified,
            expired_at: self.expired_at,
            enrollment_course_run,
            upgrade_deadline: self.upgrade_deadline,
        }
    }
}
