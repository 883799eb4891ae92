//! # Learner Schedules
//!
//! A schedule pins a learner's enrollment in a course run to a personal start
//! date and an optional upgrade deadline; message senders (nudges, upgrade
//! reminders, content highlights) select learners by those dates. A schedule
//! configuration records which of those messages a site enqueues and
//! delivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A learner's personal schedule within one course run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub username: String,
    pub course_id: String,
    pub enrollment_id: Uuid,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub upgrade_deadline: Option<DateTime<Utc>>,
    pub active: bool,
    pub created: DateTime<Utc>,
}

/// Per-site switches for schedule-driven messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub site: String,
    pub create_schedules: bool,
    pub enqueue_recurring_nudge: bool,
    pub deliver_recurring_nudge: bool,
    pub enqueue_upgrade_reminder: bool,
    pub deliver_upgrade_reminder: bool,
    pub enqueue_course_update: bool,
    pub deliver_course_update: bool,
}

impl ScheduleConfig {
    /// A configuration with every message type switched on.
    pub fn all_enabled(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            create_schedules: true,
            enqueue_recurring_nudge: true,
            deliver_recurring_nudge: true,
            enqueue_upgrade_reminder: true,
            deliver_upgrade_reminder: true,
            enqueue_course_update: true,
            deliver_course_update: true,
        }
    }
}
