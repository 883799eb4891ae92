//! # Course Runs
//!
//! The slice of the course catalog this service needs: a run's key, its
//! organization and its start date. The regain check resolves course start
//! dates through [`CourseCatalog`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of organizations created by test-data seeding (`org.1`, `org.2`, ...).
pub const SEEDED_ORG_PREFIX: &str = "org.";

/// One scheduled offering of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRun {
    /// Run key, e.g. `course-v1:org.3+Demo+2026_T1`.
    pub course_id: String,
    pub org: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl CourseRun {
    /// Build a run with a key derived from its org, number and run name.
    pub fn new(org: &str, number: &str, run: &str, start: DateTime<Utc>) -> Self {
        Self {
            course_id: format!("course-v1:{org}+{number}+{run}"),
            org: org.to_string(),
            display_name: None,
            start,
            end: None,
        }
    }

    /// Sequence number of a seeded organization (`org.7` → 7).
    pub fn org_sequence(&self) -> Option<u32> {
        self.org.strip_prefix(SEEDED_ORG_PREFIX)?.parse().ok()
    }
}

/// Lookup of course run start dates.
pub trait CourseCatalog {
    /// Start date of the run, or `None` if the run is unknown.
    fn course_start(&self, course_id: &str) -> Option<DateTime<Utc>>;
}

impl CourseCatalog for [CourseRun] {
    fn course_start(&self, course_id: &str) -> Option<DateTime<Utc>> {
        self.iter()
            .find(|run| run.course_id == course_id)
            .map(|run| run.start)
    }
}

impl CourseCatalog for Vec<CourseRun> {
    fn course_start(&self, course_id: &str) -> Option<DateTime<Utc>> {
        self.as_slice().course_start(course_id)
    }
}
