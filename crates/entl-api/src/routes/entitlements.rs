//! # Course Entitlement API
//!
//! Staff-only lifecycle endpoint for course entitlements, keyed by UUID.
//!
//! ```text
//! GET          /api/entitlements/v1/entitlements/              list (lazy expiry)
//! GET          /api/entitlements/v1/entitlements/{uuid}/        retrieve (lazy expiry)
//! PUT | PATCH  /api/entitlements/v1/entitlements/{uuid}/        partial update
//! DELETE       /api/entitlements/v1/entitlements/{uuid}/        revoke (soft delete)
//! GET          /api/entitlements/v1/entitlements/{uuid}/policy  policy report
//! ```
//!
//! Every path is also served without the trailing slash. Reads stamp
//! `expired_at` on entitlements the site policy says have expired before
//! returning them. Revocation never deletes a row.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use entl_core::{CourseMode, Entitlement};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::lifecycle::{self, EntitlementPatch, ListFilter};
use crate::request_context::RequestContext;
use crate::state::AppState;

pub const BASE_PATH: &str = "/api/entitlements/v1/entitlements";

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;
const MAX_ORDER_NUMBER_LEN: usize = 128;

// ── DTOs ────────────────────────────────────────────────────────────────────

/// Entitlement as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EntitlementResponse {
    pub uuid: Uuid,
    /// Username of the owner.
    pub user: String,
    pub course_uuid: Uuid,
    /// `verified`, `professional` or `no-id-professional`.
    pub mode: String,
    pub order_number: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
    /// Course run key of the redeemed enrollment.
    pub enrollment_course_run: Option<String>,
    pub upgrade_deadline: Option<DateTime<Utc>>,
}

impl From<Entitlement> for EntitlementResponse {
    fn from(e: Entitlement) -> Self {
        Self {
            uuid: e.uuid,
            user: e.user,
            course_uuid: e.course_uuid,
            mode: e.mode.as_str().to_string(),
            order_number: e.order_number,
            created: e.created,
            modified: e.modified,
            expired_at: e.expired_at,
            enrollment_course_run: e.enrollment_course_run.map(|r| r.course_id),
            upgrade_deadline: e.upgrade_deadline,
        }
    }
}

/// One page of entitlements.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EntitlementPage {
    /// Matching entitlements across all pages.
    pub count: usize,
    pub num_pages: usize,
    pub current_page: usize,
    pub results: Vec<EntitlementResponse>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Owner username.
    pub user: Option<String>,
    /// Course UUID.
    pub course_uuid: Option<String>,
    /// 1-based page number.
    pub page: Option<usize>,
    /// Results per page, at most 100.
    pub page_size: Option<usize>,
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateEntitlementRequest {
    pub mode: Option<String>,
    pub order_number: Option<String>,
    /// May be set on an active entitlement. Clearing or changing an existing
    /// value is rejected with 409.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub expired_at: Option<Option<DateTime<Utc>>>,
}

/// Distinguish an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl Validate for UpdateEntitlementRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(mode) = &self.mode {
            mode.parse::<CourseMode>().map_err(|e| e.to_string())?;
        }
        if let Some(order_number) = &self.order_number {
            if order_number.len() > MAX_ORDER_NUMBER_LEN {
                return Err(format!(
                    "order_number must not exceed {MAX_ORDER_NUMBER_LEN} characters"
                ));
            }
        }
        Ok(())
    }
}

impl UpdateEntitlementRequest {
    fn into_patch(self) -> Result<EntitlementPatch, AppError> {
        Ok(EntitlementPatch {
            mode: self.mode.map(|m| m.parse()).transpose()?,
            order_number: self.order_number,
            expired_at: self.expired_at,
        })
    }
}

/// Policy evaluation for one entitlement.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PolicyReportResponse {
    pub uuid: Uuid,
    pub expired: bool,
    pub refundable: bool,
    pub regainable: bool,
    /// End of the expiration period.
    pub expiration_deadline: DateTime<Utc>,
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the entitlements router.
pub fn router() -> Router<AppState> {
    let detail = get(get_entitlement)
        .put(update_entitlement)
        .patch(update_entitlement)
        .delete(revoke_entitlement);

    Router::new()
        .route(BASE_PATH, get(list_entitlements))
        .route(&format!("{BASE_PATH}/"), get(list_entitlements))
        .route(&format!("{BASE_PATH}/:uuid"), detail.clone())
        .route(&format!("{BASE_PATH}/:uuid/"), detail)
        .route(&format!("{BASE_PATH}/:uuid/policy"), get(get_policy_report))
        .route(&format!("{BASE_PATH}/:uuid/policy/"), get(get_policy_report))
}

/// Resolve the `{uuid}` path segment. Anything outside `[0-9a-f-]+` or not a
/// UUID is a 404, like an unknown entitlement.
fn parse_lookup(segment: &str) -> Result<Uuid, AppError> {
    let well_formed = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c) || c == '-');
    well_formed
        .then(|| Uuid::parse_str(segment).ok())
        .flatten()
        .ok_or_else(|| AppError::NotFound(format!("no entitlement matches '{segment}'")))
}

fn paginate(
    results: Vec<Entitlement>,
    page: Option<usize>,
    page_size: Option<usize>,
) -> Result<EntitlementPage, AppError> {
    let page_size = match page_size {
        Some(0) => return Err(AppError::Validation("page_size must be at least 1".into())),
        Some(n) => n.min(MAX_PAGE_SIZE),
        None => DEFAULT_PAGE_SIZE,
    };
    let page = page.unwrap_or(1);
    let count = results.len();
    let num_pages = count.div_ceil(page_size).max(1);
    if page == 0 || page > num_pages {
        return Err(AppError::NotFound(format!("invalid page {page}")));
    }

    let results = results
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(EntitlementResponse::from)
        .collect();
    Ok(EntitlementPage {
        count,
        num_pages,
        current_page: page,
        results,
    })
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// GET /api/entitlements/v1/entitlements/ — List entitlements.
#[utoipa::path(
    get,
    path = "/api/entitlements/v1/entitlements/",
    params(ListParams),
    responses(
        (status = 200, description = "One page of entitlements", body = EntitlementPage),
        (status = 403, description = "Caller is not staff", body = crate::error::ErrorBody),
        (status = 404, description = "Page out of range", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid filter", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "entitlements"
)]
pub(crate) async fn list_entitlements(
    State(state): State<AppState>,
    caller: CallerIdentity,
    ctx: RequestContext,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<EntitlementPage>, AppError> {
    require_role(&caller, Role::Staff)?;
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let course_uuid = params
        .course_uuid
        .as_deref()
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| AppError::Validation(format!("course_uuid '{raw}' is not a UUID")))
        })
        .transpose()?;
    let filter = ListFilter {
        user: params.user,
        course_uuid,
    };

    let policy = ctx.policy()?;
    let results = lifecycle::list(&state, &policy, &filter, Utc::now()).await?;
    Ok(Json(paginate(results, params.page, params.page_size)?))
}

/// GET /api/entitlements/v1/entitlements/{uuid}/ — Retrieve an entitlement.
#[utoipa::path(
    get,
    path = "/api/entitlements/v1/entitlements/{uuid}/",
    params(("uuid" = String, Path, description = "Entitlement UUID")),
    responses(
        (status = 200, description = "Entitlement, expired first if due", body = EntitlementResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "entitlements"
)]
pub(crate) async fn get_entitlement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    ctx: RequestContext,
    Path(lookup): Path<String>,
) -> Result<Json<EntitlementResponse>, AppError> {
    require_role(&caller, Role::Staff)?;
    let uuid = parse_lookup(&lookup)?;
    let policy = ctx.policy()?;
    let record = lifecycle::retrieve(&state, &policy, uuid, Utc::now()).await?;
    Ok(Json(record.into()))
}

/// PUT|PATCH /api/entitlements/v1/entitlements/{uuid}/ — Update an entitlement.
#[utoipa::path(
    patch,
    path = "/api/entitlements/v1/entitlements/{uuid}/",
    params(("uuid" = String, Path, description = "Entitlement UUID")),
    request_body = UpdateEntitlementRequest,
    responses(
        (status = 200, description = "Updated", body = EntitlementResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "expired_at cleared or moved", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid field", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "entitlements"
)]
pub(crate) async fn update_entitlement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(lookup): Path<String>,
    body: Result<Json<UpdateEntitlementRequest>, JsonRejection>,
) -> Result<Json<EntitlementResponse>, AppError> {
    require_role(&caller, Role::Staff)?;
    let uuid = parse_lookup(&lookup)?;
    let patch = extract_validated_json(body)?.into_patch()?;
    let record = lifecycle::update(&state, uuid, patch, Utc::now()).await?;
    Ok(Json(record.into()))
}

/// DELETE /api/entitlements/v1/entitlements/{uuid}/ — Revoke an entitlement.
#[utoipa::path(
    delete,
    path = "/api/entitlements/v1/entitlements/{uuid}/",
    params(("uuid" = String, Path, description = "Entitlement UUID")),
    responses(
        (status = 204, description = "Revoked (idempotent)"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 502, description = "Unenrollment failed; entitlement left expired", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "entitlements"
)]
pub(crate) async fn revoke_entitlement(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(lookup): Path<String>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Staff)?;
    let uuid = parse_lookup(&lookup)?;
    let outcome = lifecycle::revoke(&state, uuid, Utc::now()).await?;
    tracing::info!(
        uuid = %uuid,
        revoked_by = caller.username.as_deref().unwrap_or("-"),
        stamped = outcome.stamped,
        unenrolled = outcome.unenrolled_from.is_some(),
        "entitlement revoked"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/entitlements/v1/entitlements/{uuid}/policy — Evaluate policy.
#[utoipa::path(
    get,
    path = "/api/entitlements/v1/entitlements/{uuid}/policy",
    params(("uuid" = String, Path, description = "Entitlement UUID")),
    responses(
        (status = 200, description = "Policy checks, no side effects", body = PolicyReportResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 502, description = "Course catalog unavailable", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "entitlements"
)]
pub(crate) async fn get_policy_report(
    State(state): State<AppState>,
    caller: CallerIdentity,
    ctx: RequestContext,
    Path(lookup): Path<String>,
) -> Result<Json<PolicyReportResponse>, AppError> {
    require_role(&caller, Role::Staff)?;
    let uuid = parse_lookup(&lookup)?;
    let policy = ctx.policy()?;
    let report = lifecycle::policy_report(&state, &policy, uuid, Utc::now()).await?;
    Ok(Json(PolicyReportResponse {
        uuid,
        expired: report.expired,
        refundable: report.refundable,
        regainable: report.regainable,
        expiration_deadline: report.expiration_deadline,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn_with_state;
    use chrono::Duration;
    use entl_core::{EnrollmentRef, EntitlementPolicy, SiteConfiguration, ENTITLEMENT_POLICY_KEY};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::lms::{LmsGateway, LocalLms};
    use crate::request_context::site_middleware;
    use crate::state::AppConfig;

    fn staff() -> CallerIdentity {
        CallerIdentity {
            role: Role::Staff,
            username: Some("staff".into()),
        }
    }

    fn state_with_policy(local: &LocalLms, policy: Option<EntitlementPolicy>) -> AppState {
        let state = AppState::with_config(
            AppConfig::default(),
            LmsGateway::Local(local.clone()),
            None,
        );
        let mut configuration = SiteConfiguration::default();
        if let Some(policy) = policy {
            configuration.set_value(ENTITLEMENT_POLICY_KEY, policy.to_value());
        }
        state.sites.write().configure("example.com", configuration);
        state
    }

    fn thirty_day_policy() -> EntitlementPolicy {
        EntitlementPolicy {
            expiration_period_days: 30,
            refund_period_days: 60,
            regain_period_days: 14,
        }
    }

    fn test_router(state: &AppState, caller: CallerIdentity) -> Router {
        router()
            .layer(from_fn_with_state(state.clone(), site_middleware))
            .layer(axum::Extension(caller))
            .with_state(state.clone())
    }

    fn add(state: &AppState, age_days: i64, enrolled: bool) -> Entitlement {
        let now = Utc::now();
        let mut ent = Entitlement::new(
            "learner",
            Uuid::new_v4(),
            CourseMode::Verified,
            now - Duration::days(age_days),
        );
        if enrolled {
            ent.enrollment_course_run = Some(EnrollmentRef {
                id: Uuid::new_v4(),
                course_id: "course-v1:org.7+Demo+Run".into(),
                created: now - Duration::days(age_days),
            });
        }
        state.entitlements.insert(ent.uuid, ent.clone());
        ent
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri).header("host", "example.com");
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    fn json<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn retrieve_expires_forty_day_old_unredeemed() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 40, false);

        let (status, body) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}/{}/", ent.uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: EntitlementResponse = json(&body);
        assert!(resp.expired_at.is_some());
        assert!(state.entitlements.get(&ent.uuid).unwrap().expired_at.is_some());
    }

    #[tokio::test]
    async fn retrieve_keeps_redeemed_active() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 40, true);

        let (status, body) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}/{}", ent.uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: EntitlementResponse = json(&body);
        assert!(resp.expired_at.is_none());
        assert_eq!(
            resp.enrollment_course_run.as_deref(),
            Some("course-v1:org.7+Demo+Run")
        );
    }

    #[tokio::test]
    async fn revoke_unenrolls_and_stamps_once() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 3, true);
        let uri = format!("{BASE_PATH}/{}/", ent.uuid);

        let (status, _) = send(test_router(&state, staff()), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let first = state.entitlements.get(&ent.uuid).unwrap();
        assert!(first.expired_at.is_some());
        assert!(first.enrollment_course_run.is_none());

        let (status, _) = send(test_router(&state, staff()), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.entitlements.get(&ent.uuid).unwrap(), first);

        let calls = local.unenrollments();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].skip_refund);
        assert_eq!(calls[0].course_id, "course-v1:org.7+Demo+Run");
    }

    #[tokio::test]
    async fn revoke_with_lms_down_is_502() {
        let local = LocalLms::default();
        local.set_unavailable(true);
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 3, true);

        let (status, _) = send(
            test_router(&state, staff()),
            "DELETE",
            &format!("{BASE_PATH}/{}/", ent.uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let stored = state.entitlements.get(&ent.uuid).unwrap();
        assert!(stored.expired_at.is_some());
        assert!(stored.enrollment_course_run.is_some());
    }

    #[tokio::test]
    async fn patch_clearing_expiration_is_409() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let mut ent = add(&state, 3, false);
        ent.expired_at = Some(Utc::now());
        state.entitlements.insert(ent.uuid, ent.clone());

        let (status, body) = send(
            test_router(&state, staff()),
            "PATCH",
            &format!("{BASE_PATH}/{}/", ent.uuid),
            Some(r#"{"expired_at": null}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(String::from_utf8_lossy(&body).contains("CONFLICT"));
        assert_eq!(state.entitlements.get(&ent.uuid).unwrap().expired_at, ent.expired_at);
    }

    #[tokio::test]
    async fn put_updates_mode_and_order_number() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 3, false);

        let (status, body) = send(
            test_router(&state, staff()),
            "PUT",
            &format!("{BASE_PATH}/{}", ent.uuid),
            Some(r#"{"mode": "professional", "order_number": "EDX-77"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: EntitlementResponse = json(&body);
        assert_eq!(resp.mode, "professional");
        assert_eq!(resp.order_number.as_deref(), Some("EDX-77"));
        assert!(resp.expired_at.is_none());
    }

    #[tokio::test]
    async fn patch_unknown_mode_is_422_and_bad_json_is_400() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 3, false);
        let uri = format!("{BASE_PATH}/{}/", ent.uuid);

        let (status, _) = send(
            test_router(&state, staff()),
            "PATCH",
            &uri,
            Some(r#"{"mode": "audit"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(test_router(&state, staff()), "PATCH", &uri, Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_policy_key_is_500() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, None);
        let ent = add(&state, 40, false);

        let (status, body) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}/{}/", ent.uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!String::from_utf8_lossy(&body).contains("expiration_period_days"));
        assert!(state.entitlements.get(&ent.uuid).unwrap().expired_at.is_none());
    }

    #[tokio::test]
    async fn lookup_outside_pattern_is_404() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        for lookup in ["ZZZ", "not-a-uuid", "abc-123", "550E8400-E29B-41D4-A716-446655440000"] {
            let (status, _) = send(
                test_router(&state, staff()),
                "GET",
                &format!("{BASE_PATH}/{lookup}/"),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{lookup}");
        }
    }

    #[tokio::test]
    async fn learner_is_forbidden() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 40, false);
        let learner = CallerIdentity {
            role: Role::Learner,
            username: Some("learner".into()),
        };

        let (status, _) = send(
            test_router(&state, learner),
            "GET",
            &format!("{BASE_PATH}/{}/", ent.uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(state.entitlements.get(&ent.uuid).unwrap().expired_at.is_none());
    }

    #[tokio::test]
    async fn list_expires_before_paginating() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let stale: Vec<_> = (0..3).map(|i| add(&state, 50 - i, false)).collect();
        add(&state, 2, false);

        let (status, body) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}/?page_size=1&page=1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page: EntitlementPage = json(&body);
        assert_eq!(page.count, 4);
        assert_eq!(page.num_pages, 4);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].uuid, stale[0].uuid);

        for ent in &stale {
            assert!(
                state.entitlements.get(&ent.uuid).unwrap().expired_at.is_some(),
                "every filtered record is expired, not just the returned page"
            );
        }
    }

    #[tokio::test]
    async fn list_filters_and_validates() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 2, false);
        let mut other = Entitlement::new("someone", Uuid::new_v4(), CourseMode::Verified, Utc::now());
        other.course_uuid = Uuid::new_v4();
        state.entitlements.insert(other.uuid, other);

        let (status, body) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}?user=learner&course_uuid={}", ent.course_uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page: EntitlementPage = json(&body);
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].uuid, ent.uuid);

        let (status, _) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}/?course_uuid=nope"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}/?page=9"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn policy_report_has_no_side_effects() {
        let local = LocalLms::default();
        let state = state_with_policy(&local, Some(thirty_day_policy()));
        let ent = add(&state, 40, false);

        let (status, body) = send(
            test_router(&state, staff()),
            "GET",
            &format!("{BASE_PATH}/{}/policy", ent.uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let report: PolicyReportResponse = json(&body);
        assert!(report.expired);
        assert!(!report.refundable);
        assert!(!report.regainable);
        assert_eq!(report.expiration_deadline, ent.created + Duration::days(30));
        assert!(state.entitlements.get(&ent.uuid).unwrap().expired_at.is_none());
    }

    #[test]
    fn paginate_clamps_page_size() {
        let now = Utc::now();
        let records: Vec<_> = (0..150)
            .map(|_| Entitlement::new("u", Uuid::new_v4(), CourseMode::Verified, now))
            .collect();
        let page = paginate(records, None, Some(500)).unwrap();
        assert_eq!(page.results.len(), MAX_PAGE_SIZE);
        assert_eq!(page.num_pages, 2);
    }

    #[test]
    fn paginate_empty_has_one_page() {
        let page = paginate(Vec::new(), None, None).unwrap();
        assert_eq!(page.count, 0);
        assert_eq!(page.num_pages, 1);
        assert!(page.results.is_empty());
    }

    #[test]
    fn update_request_distinguishes_null_from_absent() {
        let absent: UpdateEntitlementRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.expired_at, None);
        let null: UpdateEntitlementRequest =
            serde_json::from_str(r#"{"expired_at": null}"#).unwrap();
        assert_eq!(null.expired_at, Some(None));
    }
}
