//! # Dataset Files
//!
//! A JSON document holding everything needed to run the service without a
//! database: site configurations, login sessions, course runs, entitlements,
//! and the schedule data written by test-data seeding. The API bootstraps
//! its in-memory state from a dataset; the CLI reads and rewrites one.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::course::CourseRun;
use crate::entitlement::Entitlement;
use crate::error::DatasetError;
use crate::schedule::{Schedule, ScheduleConfig};
use crate::site::SiteRegistry;

/// A login session usable with the session-cookie auth scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Value of the `sessionid` cookie.
    pub key: String,
    pub username: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Serialized service state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub sites: SiteRegistry,
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    #[serde(default)]
    pub course_runs: Vec<CourseRun>,
    #[serde(default)]
    pub entitlements: Vec<Entitlement>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub schedule_configs: Vec<ScheduleConfig>,
}

impl Dataset {
    /// Read a dataset file.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| DatasetError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read a dataset file, or start from an empty dataset if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, DatasetError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "dataset file not found, starting empty");
            Ok(Self::default())
        }
    }

    /// Write the dataset as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| DatasetError::Json {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Highest `org.N` sequence among the dataset's course runs.
    pub fn max_org_sequence(&self) -> Option<u32> {
        self.course_runs
            .iter()
            .filter_map(CourseRun::org_sequence)
            .max()
    }
}
