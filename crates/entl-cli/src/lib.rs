//! # entl-cli — Operator CLI for Course Entitlements
//!
//! Provides the `entl` command-line interface. Every subcommand works on a
//! JSON dataset file, the same format the API bootstraps from with
//! `ENTL_DATASET`.
//!
//! ## Subcommands
//!
//! - `entl seed` — Append a fresh course run with scheduled enrollments
//!   for exercising schedule-driven emails.
//! - `entl expire` — Sweep entitlements whose expiration period has passed.
//! - `entl inspect` — Print the policy report for one entitlement.
//!
//! ```bash
//! entl seed --dataset data/entl.json
//! entl expire --dataset data/entl.json --site courses.example.org --dry-run
//! entl inspect --dataset data/entl.json --uuid 0f7c5d1e-2b7a-4f0e-9d4c-3c1f9a6e8b21
//! ```
//!
//! `expire` and `inspect` run inside an emulated request for the chosen
//! site, so the site's `ENTITLEMENT_POLICY` is resolved by the same request
//! hooks the API uses.

pub mod expire;
pub mod inspect;
pub mod seed;

use std::path::Path;

use anyhow::{Context, Result};
use entl_api::lms::LmsGateway;
use entl_api::state::{AppConfig, AppState};
use entl_core::Dataset;

/// Site used when `--site` is not given.
pub const DEFAULT_SITE: &str = "example.com";

/// Load a dataset into a fresh in-memory state with `site` as the default.
///
/// The state uses the in-process LMS fed from the dataset's course runs and
/// no database.
pub fn load_state(path: &Path, site: &str) -> Result<(Dataset, AppState)> {
    let dataset = Dataset::load(path)
        .with_context(|| format!("failed to load dataset {}", path.display()))?;
    let config = AppConfig {
        default_site: site.to_string(),
        ..AppConfig::default()
    };
    let state = AppState::with_config(config, LmsGateway::default(), None);
    state.load_dataset(&dataset);
    Ok((dataset, state))
}

/// Single-threaded runtime for the async lifecycle operations.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
