//! # LMS Gateway
//!
//! The two LMS collaborators the entitlement endpoint calls: enrollment
//! management (unenroll on revocation) and the course catalog (run start
//! dates for the regain check).
//!
//! [`LmsGateway::Remote`] talks to a real LMS over HTTP. [`LmsGateway::Local`]
//! is an in-process stand-in used when `LMS_BASE_URL` is unset and in tests:
//! it answers course lookups from the dataset's course runs and records
//! unenrollments instead of sending them anywhere.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use entl_core::{CourseCatalog, CourseRun};
use entl_lms_client::{LmsClient, LmsError, UnenrollRequest};
use parking_lot::{Mutex, RwLock};

/// Enrollment and course catalog access.
#[derive(Debug, Clone)]
pub enum LmsGateway {
    Local(LocalLms),
    Remote(LmsClient),
}

impl LmsGateway {
    /// Unenroll a learner from a course run.
    pub async fn unenroll(&self, req: &UnenrollRequest) -> Result<(), LmsError> {
        match self {
            Self::Local(local) => local.unenroll(req),
            Self::Remote(client) => client.enrollments().unenroll(req).await,
        }
    }

    /// Start date of a course run, or `None` if the LMS does not know it.
    pub async fn course_start(&self, course_id: &str) -> Result<Option<DateTime<Utc>>, LmsError> {
        match self {
            Self::Local(local) => Ok(local.course_start(course_id)),
            Self::Remote(client) => Ok(client.courses().get(course_id).await?.map(|run| run.start)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl Default for LmsGateway {
    fn default() -> Self {
        Self::Local(LocalLms::default())
    }
}

/// Most recent unenrollments kept by [`LocalLms`]; older ones are dropped.
pub const RECORDED_UNENROLLMENTS_CAP: usize = 256;

/// In-process LMS backed by a list of course runs.
#[derive(Debug, Clone, Default)]
pub struct LocalLms {
    course_runs: Arc<RwLock<Vec<CourseRun>>>,
    unenrollments: Arc<Mutex<VecDeque<UnenrollRequest>>>,
    unavailable: Arc<AtomicBool>,
}

impl LocalLms {
    pub fn new(course_runs: Vec<CourseRun>) -> Self {
        Self {
            course_runs: Arc::new(RwLock::new(course_runs)),
            ..Self::default()
        }
    }

    /// Replace the known course runs.
    pub fn set_course_runs(&self, course_runs: Vec<CourseRun>) {
        *self.course_runs.write() = course_runs;
    }

    /// The most recent unenroll calls, oldest first, at most
    /// [`RECORDED_UNENROLLMENTS_CAP`].
    pub fn unenrollments(&self) -> Vec<UnenrollRequest> {
        self.unenrollments.lock().iter().cloned().collect()
    }

    /// Make subsequent unenroll calls fail as if the LMS were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn unenroll(&self, req: &UnenrollRequest) -> Result<(), LmsError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LmsError::ApiError {
                endpoint: "POST /api/enrollment/v1/unenroll".into(),
                status: 503,
                body: "local LMS unavailable".into(),
            });
        }
        tracing::info!(
            username = %req.username,
            course_id = %req.course_id,
            skip_refund = req.skip_refund,
            "recorded local unenrollment"
        );
        let mut recorded = self.unenrollments.lock();
        if recorded.len() == RECORDED_UNENROLLMENTS_CAP {
            recorded.pop_front();
        }
        recorded.push_back(req.clone());
        Ok(())
    }

    fn course_start(&self, course_id: &str) -> Option<DateTime<Utc>> {
        self.course_runs.read().course_start(course_id)
    }
}
