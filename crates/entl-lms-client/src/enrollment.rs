//! Typed client for the LMS enrollment API.
//!
//! Only unenrollment is needed here: revoking a redeemed entitlement
//! unenrolls the learner from the course run it was redeemed into, telling
//! the LMS not to start its own refund flow.

use serde::{Deserialize, Serialize};

use crate::config::LmsConfig;
use crate::error::LmsError;

const UNENROLL_PATH: &str = "api/enrollment/v1/unenroll";

/// Body of an unenroll call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnenrollRequest {
    pub username: String,
    pub course_id: String,
    /// When true the LMS does not process a refund for the seat.
    pub skip_refund: bool,
}

/// Client for the LMS enrollment API.
#[derive(Debug, Clone)]
pub struct EnrollmentClient {
    http: reqwest::Client,
    config: LmsConfig,
}

impl EnrollmentClient {
    pub(crate) fn new(http: reqwest::Client, config: LmsConfig) -> Self {
        Self { http, config }
    }

    /// Unenroll a learner from a course run.
    ///
    /// Calls `POST {base_url}/api/enrollment/v1/unenroll`.
    pub async fn unenroll(&self, req: &UnenrollRequest) -> Result<(), LmsError> {
        let endpoint = format!("POST /{UNENROLL_PATH}");
        let url = self.config.endpoint(UNENROLL_PATH);

        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| LmsError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LmsError::ApiError {
                endpoint,
                status,
                body,
            });
        }

        tracing::info!(
            username = %req.username,
            course_id = %req.course_id,
            skip_refund = req.skip_refund,
            "LMS unenrollment accepted"
        );
        Ok(())
    }
}
