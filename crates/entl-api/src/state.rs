//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! AppState holds only what this service owns:
//! - **Entitlements**: the in-memory entitlement store, written through to
//!   Postgres when a pool is configured.
//! - **Sites**: per-site configuration, including `ENTITLEMENT_POLICY`.
//! - **Sessions**: login sessions for the session-cookie auth scheme.
//! - **LMS gateway**: enrollments and course runs live in the LMS and are
//!   reached only through [`LmsGateway`].

use std::collections::HashMap;
use std::sync::Arc;

use entl_core::{Dataset, Entitlement, SessionRecord, SiteRegistry};
use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

use crate::lms::LmsGateway;
use crate::request_context::{AuditLogHook, RequestHook, SiteConfigurationHook};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not
/// `tokio::sync`) because the lock is never held across `.await` points.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Sessions -----------------------------------------------------------------

/// Login sessions keyed by `sessionid` cookie value.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl SessionTable {
    pub fn from_records(records: impl IntoIterator<Item = SessionRecord>) -> Self {
        let table = Self::default();
        for record in records {
            table.insert(record);
        }
        table
    }

    pub fn insert(&self, record: SessionRecord) {
        self.sessions.write().insert(record.key.clone(), record);
    }

    pub fn get(&self, key: &str) -> Option<SessionRecord> {
        self.sessions.read().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

// -- Application State --------------------------------------------------------

/// Application configuration.
///
/// Custom `Debug` redacts the auth token.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared secret for the token auth scheme. `None` disables it.
    pub auth_token: Option<String>,
    /// Site used when a request's `Host` matches no configured site.
    pub default_site: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("default_site", &self.default_site)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            default_site: "example.com".to_string(),
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub entitlements: Store<Entitlement>,
    pub sites: Arc<RwLock<SiteRegistry>>,
    pub sessions: SessionTable,
    pub lms: LmsGateway,

    /// Serializes entitlement mutations so a change is persisted before it
    /// becomes visible in the store. Never held across an LMS call.
    pub write_gate: Arc<tokio::sync::Mutex<()>>,

    // -- Database persistence (optional) --
    pub db_pool: Option<PgPool>,

    pub config: AppConfig,
}

impl AppState {
    /// Empty state with default configuration and an in-process LMS.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), LmsGateway::default(), None)
    }

    pub fn with_config(config: AppConfig, lms: LmsGateway, db_pool: Option<PgPool>) -> Self {
        let sites = SiteRegistry::new(config.default_site.clone());
        Self {
            entitlements: Store::new(),
            sites: Arc::new(RwLock::new(sites)),
            sessions: SessionTable::default(),
            lms,
            write_gate: Arc::new(tokio::sync::Mutex::new(())),
            db_pool,
            config,
        }
    }

    /// Load sites, sessions and entitlements from a dataset.
    ///
    /// Course runs feed the in-process LMS when one is in use; a remote LMS
    /// serves its own catalog. Dataset sites are merged into the registry,
    /// keeping the configured default site.
    pub fn load_dataset(&self, dataset: &Dataset) {
        {
            let mut sites = self.sites.write();
            for (domain, configuration) in &dataset.sites.configurations {
                sites.configure(domain.clone(), configuration.clone());
            }
        }
        for session in &dataset.sessions {
            self.sessions.insert(session.clone());
        }
        for entitlement in &dataset.entitlements {
            self.entitlements
                .insert(entitlement.uuid, entitlement.clone());
        }
        if let LmsGateway::Local(local) = &self.lms {
            local.set_course_runs(dataset.course_runs.clone());
        }
        tracing::info!(
            sites = dataset.sites.configurations.len(),
            sessions = dataset.sessions.len(),
            entitlements = dataset.entitlements.len(),
            course_runs = dataset.course_runs.len(),
            "loaded dataset into in-memory state"
        );
    }

    /// All entitlements ordered by creation time, then UUID.
    pub fn sorted_entitlements(&self) -> Vec<Entitlement> {
        let mut all = self.entitlements.list();
        all.sort_by(|a, b| a.created.cmp(&b.created).then(a.uuid.cmp(&b.uuid)));
        all
    }

    /// Hooks run around every request, real or emulated.
    pub fn request_hooks(&self) -> Vec<Arc<dyn RequestHook>> {
        vec![
            Arc::new(SiteConfigurationHook::new(Arc::clone(&self.sites))),
            Arc::new(AuditLogHook),
        ]
    }

    /// Hydrate the entitlement store from the database, if connected.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let entitlements = crate::db::entitlements::load_all(pool)
            .await
            .map_err(|e| format!("failed to load entitlements: {e}"))?;
        let count = entitlements.len();
        for record in entitlements {
            self.entitlements.insert(record.uuid, record);
        }

        tracing::info!(entitlements = count, "Hydrated in-memory stores from database");
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
