//! # Seed Subcommand
//!
//! Appends test data for schedule-driven emails to a dataset: a new course
//! run on the next unused `org.N` organization, one schedule per message
//! type with its own learner enrollment, and a schedule configuration that
//! switches every message on for the site.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use entl_core::{CourseRun, Dataset, Schedule, ScheduleConfig, SEEDED_ORG_PREFIX};
use uuid::Uuid;

use crate::DEFAULT_SITE;

/// Arguments for `entl seed`.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Dataset file to extend. Created if it does not exist.
    #[arg(long)]
    pub dataset: PathBuf,

    /// Site the schedule configuration is created for.
    #[arg(long, default_value = DEFAULT_SITE)]
    pub site: String,
}

/// The schedules written by one seeding run, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSchedule {
    ThreeDayNudge,
    TenDayNudge,
    UpgradeReminder,
    ContentHighlight,
}

impl SeedSchedule {
    pub const ALL: [SeedSchedule; 4] = [
        Self::ThreeDayNudge,
        Self::TenDayNudge,
        Self::UpgradeReminder,
        Self::ContentHighlight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ThreeDayNudge => "three-day-nudge",
            Self::TenDayNudge => "ten-day-nudge",
            Self::UpgradeReminder => "upgrade-reminder",
            Self::ContentHighlight => "content-highlight",
        }
    }

    /// Start offset from the seeding instant.
    ///
    /// The upgrade reminder only needs a start in the past; one day back.
    fn start_offset(self) -> Duration {
        match self {
            Self::ThreeDayNudge => Duration::days(-3),
            Self::TenDayNudge => Duration::days(-10),
            Self::UpgradeReminder => Duration::days(-1),
            Self::ContentHighlight => Duration::days(-7),
        }
    }

    fn upgrade_deadline_offset(self) -> Option<Duration> {
        match self {
            Self::UpgradeReminder => Some(Duration::days(2)),
            _ => None,
        }
    }
}

/// What a seeding run added.
#[derive(Debug, Clone)]
pub struct SeedOutcome {
    pub course_run: CourseRun,
    pub schedules: Vec<Schedule>,
}

/// Add one course run, its schedules and the site's schedule configuration.
///
/// Organizations are numbered after the highest existing `org.N`; a dataset
/// with no seeded organizations starts at `org.1`. Fails if the sequence is
/// exhausted.
pub fn seed_dataset(
    dataset: &mut Dataset,
    site: &str,
    now: DateTime<Utc>,
) -> Result<SeedOutcome> {
    let highest = dataset.max_org_sequence().unwrap_or(0);
    let sequence = highest
        .checked_add(1)
        .ok_or_else(|| anyhow!("no org sequence left after {SEEDED_ORG_PREFIX}{highest}"))?;
    let org = format!("{SEEDED_ORG_PREFIX}{sequence}");
    let mut course_run = CourseRun::new(
        &org,
        &format!("course_{sequence}"),
        &format!("Run_{sequence}"),
        now,
    );
    course_run.display_name = Some(format!("Run {sequence}"));

    let schedules: Vec<Schedule> = SeedSchedule::ALL
        .iter()
        .map(|kind| Schedule {
            id: Uuid::new_v4(),
            username: format!("{org}-{}", kind.label()),
            course_id: course_run.course_id.clone(),
            enrollment_id: Uuid::new_v4(),
            start: now + kind.start_offset(),
            upgrade_deadline: kind.upgrade_deadline_offset().map(|offset| now + offset),
            active: true,
            created: now,
        })
        .collect();

    dataset.course_runs.push(course_run.clone());
    dataset.schedules.extend(schedules.iter().cloned());
    dataset
        .schedule_configs
        .push(ScheduleConfig::all_enabled(site));

    tracing::info!(
        course_id = %course_run.course_id,
        schedules = schedules.len(),
        site,
        "seeded schedule test data"
    );

    Ok(SeedOutcome {
        course_run,
        schedules,
    })
}

/// Execute `entl seed`.
pub fn run_seed(args: &SeedArgs) -> Result<u8> {
    let mut dataset = Dataset::load_or_default(&args.dataset)
        .with_context(|| format!("failed to load dataset {}", args.dataset.display()))?;

    let outcome = seed_dataset(&mut dataset, &args.site, Utc::now())?;

    dataset
        .save(&args.dataset)
        .with_context(|| format!("failed to write dataset {}", args.dataset.display()))?;

    println!("OK: seeded course run {}", outcome.course_run.course_id);
    for (kind, schedule) in SeedSchedule::ALL.iter().zip(&outcome.schedules) {
        println!(
            "  {:<18} {}  start {}",
            kind.label(),
            schedule.username,
            schedule.start.to_rfc3339()
        );
    }
    println!("  Schedule config: {}", args.site);
    Ok(0)
}
