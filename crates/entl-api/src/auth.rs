//! # Authentication & Authorization Middleware
//!
//! Two authentication schemes, tried in order:
//!
//! ```text
//! Authorization: JWT {role}:{username}:{secret}     token scheme
//! Authorization: Bearer {role}:{username}:{secret}  token scheme (alias)
//! Authorization: JWT {secret}                       service token, treated as staff
//! Cookie: sessionid={key}                           session scheme
//! ```
//!
//! Every entitlement endpoint requires a staff caller: a learner identity
//! authenticates (no 401) but is refused with 403.
//!
//! When no token is configured and no sessions exist, authentication is
//! disabled and every request runs as an anonymous staff caller
//! (development mode).

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody, ErrorDetail};
use crate::state::SessionTable;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sessionid";

// ── Role ────────────────────────────────────────────────────────────────────

/// Caller roles, ordered by privilege (`Learner < Staff`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learner => "learner",
            Self::Staff => "staff",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, injected into request extensions
/// by [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// `None` for service tokens and when auth is disabled.
    pub username: Option<String>,
}

impl CallerIdentity {
    /// Identity used when authentication is disabled.
    pub fn anonymous_staff() -> Self {
        Self {
            role: Role::Staff,
            username: None,
        }
    }

    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
    pub sessions: SessionTable,
}

impl AuthConfig {
    /// Authentication is enforced when either scheme has something to check.
    pub fn enabled(&self) -> bool {
        self.token.is_some() || !self.sessions.is_empty()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("sessions_configured", &!self.sessions.is_empty())
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of tokens.
///
/// When lengths differ, performs a dummy comparison so timing does not
/// depend on where the mismatch is.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a token in format `{role}:{username}:{secret}` or `{secret}`.
///
/// A bare secret identifies a service caller and is granted staff. The
/// whole token is tried as a bare secret first, so a secret may itself
/// contain `:`; in the three-part form everything after the second `:` is
/// the secret.
pub fn parse_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    if constant_time_token_eq(provided, expected_secret) {
        return Ok(CallerIdentity::anonymous_staff());
    }

    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::anonymous_staff())
            } else {
                Err("invalid token".into())
            }
        }
        [role_str, username, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid token".into());
            }
            let role = match *role_str {
                "staff" => Role::Staff,
                "learner" => Role::Learner,
                other => return Err(format!("unknown role: {other}")),
            };
            let username = (!username.is_empty()).then(|| username.to_string());
            Ok(CallerIdentity { role, username })
        }
        _ => Err("invalid token format, expected {role}:{username}:{secret} or {secret}".into()),
    }
}

/// Resolve a `sessionid` cookie against the session table.
pub fn identity_from_session(
    sessions: &SessionTable,
    key: &str,
) -> Result<CallerIdentity, String> {
    let session = sessions.get(key).ok_or("unknown session")?;
    if !session.is_live(Utc::now()) {
        return Err("session expired".into());
    }
    Ok(CallerIdentity {
        role: if session.is_staff {
            Role::Staff
        } else {
            Role::Learner
        },
        username: Some(session.username),
    })
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn authenticate(config: &AuthConfig, headers: &HeaderMap) -> Result<CallerIdentity, String> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if let Some(value) = auth_header {
        let provided = value
            .strip_prefix("JWT ")
            .or_else(|| value.strip_prefix("Bearer "))
            .ok_or("authorization header must use JWT or Bearer scheme")?;
        let expected = config
            .token
            .as_deref()
            .ok_or("token authentication is not configured")?;
        return parse_token(provided, expected);
    }

    match session_cookie(headers) {
        Some(key) => identity_from_session(&config.sessions, &key),
        None => Err("missing credentials".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Authenticate the request and inject its [`CallerIdentity`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request
        .extensions()
        .get::<AuthConfig>()
        .cloned()
        .unwrap_or_default();

    if !config.enabled() {
        request
            .extensions_mut()
            .insert(CallerIdentity::anonymous_staff());
        return next.run(request).await;
    }

    match authenticate(&config, request.headers()) {
        Ok(identity) => {
            tracing::debug!(
                role = identity.role.as_str(),
                username = identity.username.as_deref().unwrap_or("-"),
                "authenticated"
            );
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
