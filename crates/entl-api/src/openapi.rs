//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into a single OpenAPI spec served
//! at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Registers the two authentication schemes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some(
                        "`{role}:{username}:{secret}` or the bare secret. \
                         The `JWT` scheme name is accepted as an alias.",
                    ))
                    .build(),
            ),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                crate::auth::SESSION_COOKIE,
            ))),
        );
    }
}

/// Assembled OpenAPI spec for the entitlement API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Course Entitlements API",
        description = "Staff endpoint for course entitlements: lazy policy expiration, updates, and soft revocation with LMS unenrollment.",
        license(name = "AGPL-3.0-or-later")
    ),
    servers((url = "/", description = "This server")),
    paths(
        crate::routes::entitlements::list_entitlements,
        crate::routes::entitlements::get_entitlement,
        crate::routes::entitlements::update_entitlement,
        crate::routes::entitlements::revoke_entitlement,
        crate::routes::entitlements::get_policy_report,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::entitlements::EntitlementResponse,
        crate::routes::entitlements::EntitlementPage,
        crate::routes::entitlements::UpdateEntitlementRequest,
        crate::routes::entitlements::PolicyReportResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "entitlements", description = "Course entitlement lifecycle"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
