//! Typed client for the LMS course catalog API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigError, LmsConfig};
use crate::error::LmsError;

const COURSES_PATH: &str = "api/courses/v1/courses";

/// The fields of a course run the entitlement service reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRunInfo {
    /// Course run key.
    pub id: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Client for the LMS course catalog API.
#[derive(Debug, Clone)]
pub struct CourseClient {
    http: reqwest::Client,
    config: LmsConfig,
}

impl CourseClient {
    pub(crate) fn new(http: reqwest::Client, config: LmsConfig) -> Self {
        Self { http, config }
    }

    /// URL of one course run. The key is a single percent-encoded path
    /// segment, so `/`, `?` and `#` inside it stay part of the key.
    fn course_url(&self, course_id: &str) -> Result<Url, LmsError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                LmsError::Config(ConfigError::InvalidUrl(
                    "base_url".into(),
                    "cannot be a base URL".into(),
                ))
            })?
            .pop_if_empty()
            .extend(COURSES_PATH.split('/'))
            .push(course_id);
        Ok(url)
    }

    /// Fetch a course run by key. Returns `Ok(None)` on 404.
    ///
    /// Calls `GET {base_url}/api/courses/v1/courses/{course_id}`.
    pub async fn get(&self, course_id: &str) -> Result<Option<CourseRunInfo>, LmsError> {
        let endpoint = format!("GET /{COURSES_PATH}/{course_id}");
        let url = self.course_url(course_id)?;

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| LmsError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LmsError::ApiError {
                endpoint,
                status,
                body,
            });
        }

        resp.json()
            .await
            .map(Some)
            .map_err(|e| LmsError::Deserialization {
                endpoint,
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> CourseClient {
        CourseClient::new(reqwest::Client::new(), LmsConfig::new(base).unwrap())
    }

    #[test]
    fn course_url_keeps_run_key_characters() {
        let url = client("https://lms.example.com")
            .course_url("course-v1:org.1+Demo+Run")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://lms.example.com/api/courses/v1/courses/course-v1:org.1+Demo+Run"
        );
    }

    #[test]
    fn course_url_encodes_reserved_characters_in_key() {
        let url = client("https://lms.example.com/edx/")
            .course_url("org/course/run?x#y")
            .unwrap();
        assert_eq!(url.path(), "/edx/api/courses/v1/courses/org%2Fcourse%2Frun%3Fx%23y");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }
}
