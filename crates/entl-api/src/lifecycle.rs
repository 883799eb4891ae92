//! # Entitlement Lifecycle
//!
//! The operations behind the entitlement endpoint, independent of HTTP so
//! the sweep command can run them inside an emulated request.
//!
//! Every mutation is applied to a copy of the record, written through to
//! Postgres when a pool is configured, and only then stored in memory, so a
//! failed write changes nothing. `expired_at` only ever
//! moves from `None` to `Some`: lazy expiration and revocation both go
//! through [`Entitlement::mark_expired`], which keeps the first stamp.

use chrono::{DateTime, Utc};
use entl_core::{
    is_entitlement_expired, CourseMode, Entitlement, EntitlementPolicy, PolicyReport,
};
use entl_lms_client::UnenrollRequest;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// List filters. Both are exact matches.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub user: Option<String>,
    pub course_uuid: Option<Uuid>,
}

impl ListFilter {
    fn matches(&self, entitlement: &Entitlement) -> bool {
        self.user.as_deref().map_or(true, |u| entitlement.user == u)
            && self
                .course_uuid
                .map_or(true, |c| entitlement.course_uuid == c)
    }
}

/// Partial update. `None` leaves a field untouched; for `expired_at`,
/// `Some(None)` asks to clear the stamp.
#[derive(Debug, Clone, Default)]
pub struct EntitlementPatch {
    pub mode: Option<CourseMode>,
    pub order_number: Option<String>,
    pub expired_at: Option<Option<DateTime<Utc>>>,
}

/// What a revocation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeOutcome {
    /// `expired_at` was stamped by this call.
    pub stamped: bool,
    /// Course run the learner was unenrolled from by this call.
    pub unenrolled_from: Option<String>,
}

fn not_found(uuid: Uuid) -> AppError {
    AppError::NotFound(format!("entitlement {uuid} not found"))
}

/// Write an entitlement through to the database, if connected.
async fn persist(state: &AppState, record: &Entitlement) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::entitlements::upsert(pool, record).await {
            tracing::error!(uuid = %record.uuid, error = %e, "failed to persist entitlement");
            return Err(AppError::Internal(format!(
                "failed to persist entitlement {}",
                record.uuid
            )));
        }
    }
    Ok(())
}

/// Apply `f` to a copy of the stored entitlement and, if it reports a
/// change, persist the copy before it replaces the stored record.
///
/// A failed write leaves the store untouched, so memory never holds a
/// state the database has not accepted. Returns the current record and
/// whether `f` changed it.
async fn commit(
    state: &AppState,
    uuid: Uuid,
    f: impl FnOnce(&mut Entitlement) -> Result<bool, AppError>,
) -> Result<(Entitlement, bool), AppError> {
    let _gate = state.write_gate.lock().await;
    let mut record = state.entitlements.get(&uuid).ok_or_else(|| not_found(uuid))?;
    let changed = f(&mut record)?;
    if changed {
        persist(state, &record).await?;
        state.entitlements.insert(uuid, record.clone());
    }
    Ok((record, changed))
}

/// Stamp `expired_at` if the entitlement is active and past its expiration
/// period. Returns the current record and whether this call stamped it.
async fn expire_record(
    state: &AppState,
    policy: &EntitlementPolicy,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Result<(Entitlement, bool), AppError> {
    let current = state.entitlements.get(&uuid).ok_or_else(|| not_found(uuid))?;
    if current.is_expired() || !is_entitlement_expired(&current, policy, now) {
        return Ok((current, false));
    }

    let (record, changed) = commit(state, uuid, |e| {
        Ok(!e.is_expired() && is_entitlement_expired(e, policy, now) && e.mark_expired(now))
    })
    .await?;

    if changed {
        tracing::info!(
            uuid = %uuid,
            user = %record.user,
            created = %record.created,
            "entitlement expired by policy"
        );
    }
    Ok((record, changed))
}

/// Lazily expire one entitlement. Returns the current record, changed or not.
pub async fn expire_if_due(
    state: &AppState,
    policy: &EntitlementPolicy,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Result<Entitlement, AppError> {
    Ok(expire_record(state, policy, uuid, now).await?.0)
}

/// Fetch one entitlement, lazily expiring it first.
pub async fn retrieve(
    state: &AppState,
    policy: &EntitlementPolicy,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Result<Entitlement, AppError> {
    expire_if_due(state, policy, uuid, now).await
}

/// Every entitlement matching the filter, in `(created, uuid)` order, each
/// lazily expired.
pub async fn list(
    state: &AppState,
    policy: &EntitlementPolicy,
    filter: &ListFilter,
    now: DateTime<Utc>,
) -> Result<Vec<Entitlement>, AppError> {
    let matching: Vec<Uuid> = state
        .sorted_entitlements()
        .into_iter()
        .filter(|e| filter.matches(e))
        .map(|e| e.uuid)
        .collect();

    let mut results = Vec::with_capacity(matching.len());
    for uuid in matching {
        results.push(expire_if_due(state, policy, uuid, now).await?);
    }
    Ok(results)
}

/// Apply a partial update.
pub async fn update(
    state: &AppState,
    uuid: Uuid,
    patch: EntitlementPatch,
    now: DateTime<Utc>,
) -> Result<Entitlement, AppError> {
    let (record, changed) = commit(state, uuid, |e| {
        let mut changed = false;
        if let Some(at) = patch.expired_at {
            changed |= e.set_expired_at(at, now)?;
        }
        if let Some(mode) = patch.mode {
            changed |= e.mode != mode;
            e.mode = mode;
        }
        if let Some(order_number) = patch.order_number {
            changed |= e.order_number.as_deref() != Some(order_number.as_str());
            e.order_number = Some(order_number);
        }
        if changed {
            e.modified = now;
        }
        Ok(changed)
    })
    .await?;

    if changed {
        tracing::info!(uuid = %uuid, mode = %record.mode, "entitlement updated");
    }
    Ok(record)
}

/// Soft-revoke an entitlement.
///
/// Stamps `expired_at` if unset and persists it, then unenrolls the learner
/// (without refund) and clears the enrollment reference. The two steps are
/// not atomic: if the LMS call fails the entitlement stays expired and still
/// linked, and a later revoke retries the unenrollment.
pub async fn revoke(
    state: &AppState,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Result<RevokeOutcome, AppError> {
    let (record, stamped) = commit(state, uuid, |e| Ok(e.mark_expired(now))).await?;

    if stamped {
        tracing::info!(uuid = %uuid, expired_at = %now, "set expired_at on revoked entitlement");
    }

    let Some(enrollment) = record.enrollment_course_run.clone() else {
        return Ok(RevokeOutcome {
            stamped,
            unenrolled_from: None,
        });
    };

    let request = UnenrollRequest {
        username: record.user.clone(),
        course_id: enrollment.course_id.clone(),
        skip_refund: true,
    };
    state.lms.unenroll(&request).await.map_err(|e| {
        tracing::error!(
            uuid = %uuid,
            course_id = %enrollment.course_id,
            error = %e,
            "unenrollment failed, entitlement left expired and enrolled"
        );
        AppError::from(e)
    })?;

    commit(state, uuid, |e| Ok(e.clear_enrollment(now).is_some())).await?;
    tracing::info!(
        uuid = %uuid,
        course_id = %enrollment.course_id,
        "unenrolled learner and cleared enrollment of revoked entitlement"
    );

    Ok(RevokeOutcome {
        stamped,
        unenrolled_from: Some(enrollment.course_id),
    })
}

/// Evaluate every policy check for one entitlement without modifying it.
pub async fn policy_report(
    state: &AppState,
    policy: &EntitlementPolicy,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Result<PolicyReport, AppError> {
    let record = state.entitlements.get(&uuid).ok_or_else(|| not_found(uuid))?;
    let course_start = match &record.enrollment_course_run {
        Some(enrollment) => state.lms.course_start(&enrollment.course_id).await?,
        None => None,
    };
    Ok(PolicyReport::evaluate(&record, policy, course_start, now)?)
}

/// Active entitlements the expiration predicate marks as expired.
pub fn due_for_expiration(
    state: &AppState,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> Vec<Uuid> {
    state
        .sorted_entitlements()
        .into_iter()
        .filter(|e| !e.is_expired() && is_entitlement_expired(e, policy, now))
        .map(|e| e.uuid)
        .collect()
}

/// Expire every entitlement that is due. Returns the UUIDs stamped.
pub async fn sweep_expired(
    state: &AppState,
    policy: &EntitlementPolicy,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, AppError> {
    let mut expired = Vec::new();
    for uuid in due_for_expiration(state, policy, now) {
        if expire_record(state, policy, uuid, now).await?.1 {
            expired.push(uuid);
        }
    }
    tracing::info!(count = expired.len(), "expiration sweep complete");
    Ok(expired)
}
