//! # Expire Subcommand
//!
//! Runs the expiration sweep over a dataset inside an emulated request for
//! one site, then writes the stamped entitlements back to the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use entl_api::error::AppError;
use entl_api::lifecycle;
use entl_api::request_context::emulate_request_async;
use entl_api::state::AppState;
use entl_core::Site;
use uuid::Uuid;

use crate::{load_state, runtime, DEFAULT_SITE};

/// Arguments for `entl expire`.
#[derive(Args, Debug)]
pub struct ExpireArgs {
    /// Dataset file to sweep.
    #[arg(long)]
    pub dataset: PathBuf,

    /// Site whose entitlement policy applies.
    #[arg(long, default_value = DEFAULT_SITE)]
    pub site: String,

    /// List the entitlements that would expire without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Expire every due entitlement under `site`'s policy.
///
/// With `dry_run` nothing is stamped; the UUIDs that would be are returned.
pub async fn expire_for_site(
    state: &AppState,
    site: &str,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, AppError> {
    emulate_request_async(
        Site::new(site),
        None,
        state.request_hooks(),
        |ctx| async move {
            let policy = ctx.policy()?;
            if dry_run {
                Ok(lifecycle::due_for_expiration(state, &policy, now))
            } else {
                lifecycle::sweep_expired(state, &policy, now).await
            }
        },
    )
    .await
}

/// Execute `entl expire`.
pub fn run_expire(args: &ExpireArgs) -> Result<u8> {
    let (mut dataset, state) = load_state(&args.dataset, &args.site)?;

    let uuids = runtime()?
        .block_on(expire_for_site(&state, &args.site, args.dry_run, Utc::now()))
        .with_context(|| format!("expiration sweep failed for site {}", args.site))?;

    if args.dry_run {
        println!("DRY RUN: {} entitlement(s) due for expiration", uuids.len());
        for uuid in &uuids {
            println!("  {uuid}");
        }
        return Ok(0);
    }

    dataset.entitlements = state.sorted_entitlements();
    dataset
        .save(&args.dataset)
        .with_context(|| format!("failed to write dataset {}", args.dataset.display()))?;

    println!("OK: expired {} entitlement(s)", uuids.len());
    for uuid in &uuids {
        println!("  {uuid}");
    }
    Ok(0)
}
