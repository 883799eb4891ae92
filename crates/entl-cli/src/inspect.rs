//! # Inspect Subcommand
//!
//! Prints the policy report for one entitlement as JSON: whether it is
//! expired, refundable or regainable right now, and when its expiration
//! period ends. Nothing is written back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use entl_api::error::AppError;
use entl_api::lifecycle;
use entl_api::request_context::emulate_request_async;
use entl_api::state::AppState;
use entl_core::{PolicyReport, Site};
use uuid::Uuid;

use crate::{load_state, runtime, DEFAULT_SITE};

/// Arguments for `entl inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Dataset file holding the entitlement.
    #[arg(long)]
    pub dataset: PathBuf,

    /// Entitlement UUID.
    #[arg(long)]
    pub uuid: Uuid,

    /// Site whose entitlement policy applies.
    #[arg(long, default_value = DEFAULT_SITE)]
    pub site: String,
}

/// Evaluate the policy report for `uuid` under `site`'s policy.
pub async fn inspect_for_site(
    state: &AppState,
    site: &str,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Result<PolicyReport, AppError> {
    emulate_request_async(
        Site::new(site),
        None,
        state.request_hooks(),
        |ctx| async move {
            let policy = ctx.policy()?;
            lifecycle::policy_report(state, &policy, uuid, now).await
        },
    )
    .await
}

/// Execute `entl inspect`.
pub fn run_inspect(args: &InspectArgs) -> Result<u8> {
    let (_, state) = load_state(&args.dataset, &args.site)?;

    let report = runtime()?
        .block_on(inspect_for_site(&state, &args.site, args.uuid, Utc::now()))
        .with_context(|| format!("failed to inspect entitlement {}", args.uuid))?;

    let json = serde_json::to_string_pretty(&report).context("failed to render report")?;
    println!("{json}");
    Ok(0)
}
