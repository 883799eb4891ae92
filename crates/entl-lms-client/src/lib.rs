//! # entl-lms-client — Typed Rust client for the LMS
//!
//! The entitlement service does not own enrollments or the course catalog.
//! This crate is its only path to them:
//! - **Enrollments** via `POST /api/enrollment/v1/unenroll`
//! - **Course runs** via `GET /api/courses/v1/courses/{course_id}`
//!
//! Calls are made once; there is no retry layer. A failed unenroll surfaces
//! to the caller, which decides what partial state is acceptable.

pub mod config;
pub mod courses;
pub mod enrollment;
pub mod error;

pub use config::{ConfigError, LmsConfig};
pub use courses::CourseRunInfo;
pub use enrollment::UnenrollRequest;
pub use error::LmsError;

use std::time::Duration;

/// Top-level LMS client. Holds a sub-client per LMS API.
#[derive(Debug, Clone)]
pub struct LmsClient {
    enrollments: enrollment::EnrollmentClient,
    courses: courses::CourseClient,
}

impl LmsClient {
    /// Create a new LMS client from configuration.
    pub fn new(config: LmsConfig) -> Result<Self, LmsError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.api_token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| LmsError::Config(ConfigError::InvalidToken))?,
            );
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| LmsError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        Ok(Self {
            enrollments: enrollment::EnrollmentClient::new(http.clone(), config.clone()),
            courses: courses::CourseClient::new(http, config),
        })
    }

    /// Access the enrollment client.
    pub fn enrollments(&self) -> &enrollment::EnrollmentClient {
        &self.enrollments
    }

    /// Access the course catalog client.
    pub fn courses(&self) -> &courses::CourseClient {
        &self.courses
    }
}
