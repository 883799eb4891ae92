//! # Service Bootstrap
//!
//! Builds the [`AppState`] the server starts with.
//!
//! ## Bootstrap Sequence
//!
//! 1. **Build state** from configuration, LMS gateway and optional pool.
//! 2. **Load dataset** named by `ENTL_DATASET`, if set: site configurations,
//!    sessions, course runs (for the in-process LMS) and entitlements.
//! 3. **Check the default site** has an `ENTITLEMENT_POLICY`, warning if not.
//! 4. **Log** a startup banner.
//!
//! Database hydration runs afterwards in `main`, so rows in Postgres win
//! over dataset entries with the same UUID.

use std::path::{Path, PathBuf};

use entl_core::{Dataset, DatasetError, EntitlementPolicy};
use sqlx::PgPool;

use crate::lms::LmsGateway;
use crate::state::{AppConfig, AppState};

/// Errors during bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// `ENTL_DATASET` names a file that does not exist.
    #[error("dataset not found: {path}")]
    DatasetNotFound { path: String },

    /// The dataset exists but could not be read or parsed.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Bootstrap using `ENTL_DATASET` from the environment.
pub fn bootstrap(
    config: AppConfig,
    lms: LmsGateway,
    db_pool: Option<PgPool>,
) -> Result<AppState, BootstrapError> {
    let dataset_path = std::env::var("ENTL_DATASET").ok().map(PathBuf::from);
    bootstrap_with_dataset(config, lms, db_pool, dataset_path.as_deref())
}

/// Bootstrap from an explicit dataset path.
pub fn bootstrap_with_dataset(
    config: AppConfig,
    lms: LmsGateway,
    db_pool: Option<PgPool>,
    dataset_path: Option<&Path>,
) -> Result<AppState, BootstrapError> {
    let state = AppState::with_config(config, lms, db_pool);

    if let Some(path) = dataset_path {
        if !path.exists() {
            return Err(BootstrapError::DatasetNotFound {
                path: path.display().to_string(),
            });
        }
        let dataset = Dataset::load(path)?;
        state.load_dataset(&dataset);
    }

    check_default_policy(&state);
    log_banner(&state, dataset_path);
    Ok(state)
}

fn check_default_policy(state: &AppState) {
    let (site, configuration) = state.sites.read().resolve(None);
    if let Err(e) = EntitlementPolicy::from_site(&configuration) {
        tracing::warn!(
            site = %site,
            error = %e,
            "default site has no usable entitlement policy; entitlement reads will fail"
        );
    }
}

fn log_banner(state: &AppState, dataset_path: Option<&Path>) {
    let dataset = dataset_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    let lms = if state.lms.is_remote() {
        "remote"
    } else {
        "in-process"
    };
    let persistence = if state.db_pool.is_some() {
        "postgres"
    } else {
        "in-memory"
    };

    tracing::info!(
        port = state.config.port,
        default_site = %state.config.default_site,
        dataset = %dataset,
        lms,
        persistence,
        entitlements = state.entitlements.len(),
        "entitlement service bootstrap complete"
    );

    println!("┌──────────────────────────────────────────────────┐");
    println!("│  Course Entitlements API                         │");
    println!("├──────────────────────────────────────────────────┤");
    println!("│  Port:          {:<33}│", state.config.port);
    println!("│  Default site:  {:<33}│", state.config.default_site);
    println!("│  LMS:           {:<33}│", lms);
    println!("│  Persistence:   {:<33}│", persistence);
    println!("│  Entitlements:  {:<33}│", state.entitlements.len());
    println!("└──────────────────────────────────────────────────┘");
}
