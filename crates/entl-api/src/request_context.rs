//! # Request Context & Scoped Hooks
//!
//! Code that needs "the current site" (to read `ENTITLEMENT_POLICY`, for
//! example) takes a [`RequestContext`] argument. HTTP requests get one from
//! [`site_middleware`]; background jobs and CLI commands build one with
//! [`RequestScope::emulated`], which runs the same [`RequestHook`]s an HTTP
//! request would.
//!
//! ## Hook order
//!
//! ```text
//! begin:   before_request   hook[0], hook[1], ... hook[n]
//! finish:  after_response   hook[n], ... hook[0]   (Ok)
//!          on_error         hook[n], ... hook[0]   (Err, or scope dropped)
//! ```
//!
//! Dropping a scope without calling [`RequestScope::finish`] (early return,
//! panic, cancelled future) runs the `on_error` hooks from `Drop`.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, request::Parts};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use entl_core::{EntitlementPolicy, PolicyError, Site, SiteConfiguration, SiteRegistry};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

/// Everything request-scoped code may need to know about the current request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub site: Site,
    /// Username of the caller, if known.
    pub user: Option<String>,
    /// Configuration of `site`, filled in by [`SiteConfigurationHook`].
    pub configuration: SiteConfiguration,
    pub started_at: DateTime<Utc>,
    /// True when no HTTP request backs this context.
    pub emulated: bool,
}

impl RequestContext {
    pub fn new(site: Site, user: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            site,
            user,
            configuration: SiteConfiguration::default(),
            started_at: Utc::now(),
            emulated: false,
        }
    }

    /// The site's entitlement policy.
    pub fn policy(&self) -> Result<EntitlementPolicy, PolicyError> {
        EntitlementPolicy::from_site(&self.configuration)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| AppError::Internal("no request context in request extensions".into()))
    }
}

// ── Hooks ───────────────────────────────────────────────────────────────────

/// Optional per-request callbacks. Every method defaults to a no-op.
pub trait RequestHook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn before_request(&self, _ctx: &mut RequestContext) {}

    fn after_response(&self, _ctx: &RequestContext) {}

    fn on_error(&self, _ctx: &RequestContext, _error: &str) {}
}

/// Resolves the context's site against the registry and loads its
/// configuration. Unknown domains resolve to the default site.
#[derive(Debug, Clone)]
pub struct SiteConfigurationHook {
    sites: Arc<RwLock<SiteRegistry>>,
}

impl SiteConfigurationHook {
    pub fn new(sites: Arc<RwLock<SiteRegistry>>) -> Self {
        Self { sites }
    }
}

impl RequestHook for SiteConfigurationHook {
    fn name(&self) -> &'static str {
        "site_configuration"
    }

    fn before_request(&self, ctx: &mut RequestContext) {
        let (site, configuration) = self.sites.read().resolve(Some(&ctx.site.domain));
        if site != ctx.site {
            tracing::debug!(requested = %ctx.site, resolved = %site, "site fell back to default");
        }
        ctx.site = site;
        ctx.configuration = configuration;
    }
}

/// Emits one structured log line per completed request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogHook;

impl RequestHook for AuditLogHook {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    fn after_response(&self, ctx: &RequestContext) {
        tracing::info!(
            request_id = %ctx.request_id,
            site = %ctx.site,
            user = ctx.user.as_deref().unwrap_or("-"),
            emulated = ctx.emulated,
            elapsed_ms = (Utc::now() - ctx.started_at).num_milliseconds(),
            "request completed"
        );
    }

    fn on_error(&self, ctx: &RequestContext, error: &str) {
        tracing::warn!(
            request_id = %ctx.request_id,
            site = %ctx.site,
            user = ctx.user.as_deref().unwrap_or("-"),
            emulated = ctx.emulated,
            error,
            "request failed"
        );
    }
}

// ── Scope ───────────────────────────────────────────────────────────────────

const ABANDONED: &str = "request scope dropped before completion";

/// A request in progress: a context plus the hooks still owed a completion
/// callback.
pub struct RequestScope {
    ctx: RequestContext,
    hooks: Vec<Arc<dyn RequestHook>>,
    finished: bool,
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("RequestScope")
            .field("ctx", &self.ctx)
            .field("hooks", &names)
            .field("finished", &self.finished)
            .finish()
    }
}

impl RequestScope {
    /// Run every `before_request` hook in order and open the scope.
    pub fn begin(mut ctx: RequestContext, hooks: Vec<Arc<dyn RequestHook>>) -> Self {
        for hook in &hooks {
            hook.before_request(&mut ctx);
        }
        Self {
            ctx,
            hooks,
            finished: false,
        }
    }

    /// Open a scope for work that has no HTTP request behind it.
    pub fn emulated(site: Site, user: Option<String>, hooks: Vec<Arc<dyn RequestHook>>) -> Self {
        let mut ctx = RequestContext::new(site, user);
        ctx.emulated = true;
        Self::begin(ctx, hooks)
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Close the scope, running completion hooks for `result`, and hand the
    /// result back unchanged.
    pub fn finish<T, E: Display>(mut self, result: Result<T, E>) -> Result<T, E> {
        self.finished = true;
        match &result {
            Ok(_) => self.run_after_response(),
            Err(e) => self.run_on_error(&e.to_string()),
        }
        result
    }

    fn run_after_response(&self) {
        for hook in self.hooks.iter().rev() {
            hook.after_response(&self.ctx);
        }
    }

    fn run_on_error(&self, error: &str) {
        for hook in self.hooks.iter().rev() {
            hook.on_error(&self.ctx, error);
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.run_on_error(ABANDONED);
        }
    }
}

/// Run `f` inside an emulated request for `site`.
pub fn emulate_request<T, E, F>(
    site: Site,
    user: Option<String>,
    hooks: Vec<Arc<dyn RequestHook>>,
    f: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce(&RequestContext) -> Result<T, E>,
{
    let scope = RequestScope::emulated(site, user, hooks);
    let result = f(scope.context());
    scope.finish(result)
}

/// Async form of [`emulate_request`]. The closure receives its own copy of
/// the context.
pub async fn emulate_request_async<T, E, F, Fut>(
    site: Site,
    user: Option<String>,
    hooks: Vec<Arc<dyn RequestHook>>,
    f: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce(RequestContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let scope = RequestScope::emulated(site, user, hooks);
    let result = f(scope.context().clone()).await;
    scope.finish(result)
}

// ── HTTP middleware ─────────────────────────────────────────────────────────

/// Wrap each HTTP request in a [`RequestScope`] for the site named by its
/// `Host` header and make the resulting [`RequestContext`] available to
/// handlers. Runs after authentication so the caller's username is known.
pub async fn site_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let user = request
        .extensions()
        .get::<CallerIdentity>()
        .and_then(|c| c.username.clone());

    let scope = RequestScope::begin(RequestContext::new(Site::new(host), user), state.request_hooks());
    request.extensions_mut().insert(scope.context().clone());

    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();

    let outcome = if status.is_server_error() {
        Err(format!("status {}", status.as_u16()))
    } else {
        Ok(())
    };
    tracing::debug!(
        status = status.as_u16(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "request scope closing"
    );
    // Completion hooks only observe the outcome.
    let _ = scope.finish(outcome);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use entl_core::ENTITLEMENT_POLICY_KEY;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records every callback it receives as "<label>:<event>".
    struct RecordingHook {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RequestHook for RecordingHook {
        fn name(&self) -> &'static str {
            self.label
        }

        fn before_request(&self, _ctx: &mut RequestContext) {
            self.log.lock().push(format!("{}:before", self.label));
        }

        fn after_response(&self, _ctx: &RequestContext) {
            self.log.lock().push(format!("{}:after", self.label));
        }

        fn on_error(&self, _ctx: &RequestContext, error: &str) {
            self.log.lock().push(format!("{}:error:{error}", self.label));
        }
    }

    /// Implements nothing beyond its name.
    struct SilentHook;

    impl RequestHook for SilentHook {
        fn name(&self) -> &'static str {
            "silent"
        }
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>) -> Vec<Arc<dyn RequestHook>> {
        vec![
            Arc::new(RecordingHook {
                label: "a",
                log: Arc::clone(log),
            }),
            Arc::new(SilentHook),
            Arc::new(RecordingHook {
                label: "b",
                log: Arc::clone(log),
            }),
        ]
    }

    fn site() -> Site {
        Site::new("example.com")
    }

    #[test]
    fn success_runs_after_hooks_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let out: Result<u32, String> =
            emulate_request(site(), None, recording(&log), |_ctx| Ok(7));
        assert_eq!(out, Ok(7));
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "b:after", "a:after"]
        );
    }

    #[test]
    fn error_runs_error_hooks_and_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let out: Result<(), String> =
            emulate_request(site(), None, recording(&log), |_ctx| Err("boom".to_string()));
        assert_eq!(out, Err("boom".to_string()));
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "b:error:boom", "a:error:boom"]
        );
    }

    #[test]
    fn dropped_scope_runs_error_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let _scope = RequestScope::emulated(site(), None, recording(&log));
        }
        let log = log.lock();
        assert_eq!(log.len(), 4);
        assert_eq!(log[2], format!("b:error:{ABANDONED}"));
        assert_eq!(log[3], format!("a:error:{ABANDONED}"));
    }

    #[test]
    fn panic_inside_scope_runs_error_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = recording(&log);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), String> = emulate_request(site(), None, hooks, |_ctx| {
                panic!("task crashed");
            });
        }));
        assert!(result.is_err());
        assert!(log.lock().iter().any(|e| e.starts_with("a:error")));
    }

    #[test]
    fn finish_does_not_rerun_hooks_on_drop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scope = RequestScope::emulated(site(), None, recording(&log));
        let _ = scope.finish(Ok::<(), String>(()));
        assert_eq!(log.lock().len(), 4);
    }

    #[tokio::test]
    async fn async_form_passes_context() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let user = emulate_request_async(
            site(),
            Some("staff".into()),
            recording(&log),
            |ctx| async move { Ok::<_, String>(ctx.user) },
        )
        .await
        .unwrap();
        assert_eq!(user.as_deref(), Some("staff"));
        assert_eq!(log.lock().last().map(String::as_str), Some("a:after"));
    }

    #[test]
    fn site_configuration_hook_loads_policy() {
        let mut registry = SiteRegistry::new("example.com");
        let mut cfg = SiteConfiguration::default();
        cfg.set_value(
            ENTITLEMENT_POLICY_KEY,
            json!({
                "expiration_period_days": 30,
                "refund_period_days": 60,
                "regain_period_days": 14
            }),
        );
        registry.configure("example.com", cfg);
        let hooks: Vec<Arc<dyn RequestHook>> = vec![Arc::new(SiteConfigurationHook::new(
            Arc::new(RwLock::new(registry)),
        ))];

        let policy = emulate_request(Site::new("unknown.test"), None, hooks, |ctx| {
            assert_eq!(ctx.site.domain, "example.com");
            assert!(ctx.emulated);
            ctx.policy()
        })
        .unwrap();
        assert_eq!(policy.expiration_period_days, 30);
    }

    #[test]
    fn policy_without_configuration_is_missing_key() {
        let ctx = RequestContext::new(site(), None);
        assert_eq!(
            ctx.policy(),
            Err(PolicyError::MissingKey("expiration_period_days"))
        );
    }
}
