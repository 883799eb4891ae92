//! Contract tests for the LMS client against a mock LMS.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/api/enrollment/v1/unenroll` | `unenroll_*` |
//! | GET    | `/api/courses/v1/courses/{course_id}` | `course_run_*` |

use entl_lms_client::{LmsClient, LmsConfig, LmsError, UnenrollRequest};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer, token: Option<&str>) -> LmsClient {
    let mut config = LmsConfig::new(&mock_server.uri()).unwrap();
    config.api_token = token.map(str::to_string);
    config.timeout_secs = 5;
    LmsClient::new(config).unwrap()
}

fn unenroll_request() -> UnenrollRequest {
    UnenrollRequest {
        username: "learner".into(),
        course_id: "course-v1:org.1+Demo+Run".into(),
        skip_refund: true,
    }
}

// ── POST /api/enrollment/v1/unenroll ─────────────────────────────────

#[tokio::test]
async fn unenroll_sends_skip_refund_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/enrollment/v1/unenroll"))
        .and(body_json(serde_json::json!({
            "username": "learner",
            "course_id": "course-v1:org.1+Demo+Run",
            "skip_refund": true
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, None);
    client
        .enrollments()
        .unenroll(&unenroll_request())
        .await
        .unwrap();
}

#[tokio::test]
async fn unenroll_sends_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/enrollment/v1/unenroll"))
        .and(header("authorization", "Bearer lms-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, Some("lms-token"));
    client
        .enrollments()
        .unenroll(&unenroll_request())
        .await
        .unwrap();
}

#[tokio::test]
async fn unenroll_surfaces_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/enrollment/v1/unenroll"))
        .respond_with(ResponseTemplate::new(500).set_body_string("enrollment service down"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, None);
    let err = client
        .enrollments()
        .unenroll(&unenroll_request())
        .await
        .unwrap_err();
    match err {
        LmsError::ApiError { status, body, .. } => {
            assert_eq!(status, 500);
            assert!(body.contains("enrollment service down"));
        }
        other => panic!("expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn unenroll_transport_failure_is_http_error() {
    let config = LmsConfig {
        base_url: "http://127.0.0.1:1".parse().unwrap(),
        api_token: None,
        timeout_secs: 1,
    };
    let client = LmsClient::new(config).unwrap();
    let err = client
        .enrollments()
        .unenroll(&unenroll_request())
        .await
        .unwrap_err();
    assert!(matches!(err, LmsError::Http { .. }));
    assert_eq!(err.endpoint(), Some("POST /api/enrollment/v1/unenroll"));
}

// ── GET /api/courses/v1/courses/{course_id} ──────────────────────────

#[tokio::test]
async fn course_run_returns_start_date() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/courses/v1/courses/course-v1:org.1+Demo+Run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "course-v1:org.1+Demo+Run",
            "start": "2026-01-15T12:00:00Z",
            "name": "Demo Course",
            "pacing": "instructor"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, None);
    let run = client
        .courses()
        .get("course-v1:org.1+Demo+Run")
        .await
        .unwrap()
        .expect("course run should be found");
    assert_eq!(run.id, "course-v1:org.1+Demo+Run");
    assert_eq!(run.start.to_rfc3339(), "2026-01-15T12:00:00+00:00");
    assert_eq!(run.name.as_deref(), Some("Demo Course"));
    assert!(run.end.is_none());
}

#[tokio::test]
async fn course_run_not_found_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/courses/v1/courses/course-v1:org.9+Demo+Run"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, None);
    let run = client
        .courses()
        .get("course-v1:org.9+Demo+Run")
        .await
        .unwrap();
    assert!(run.is_none());
}

#[tokio::test]
async fn course_run_malformed_body_is_deserialization_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/courses/v1/courses/course-v1:org.1+Demo+Run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "course-v1:org.1+Demo+Run"
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, None);
    let err = client
        .courses()
        .get("course-v1:org.1+Demo+Run")
        .await
        .unwrap_err();
    assert!(matches!(err, LmsError::Deserialization { .. }));
}

#[tokio::test]
async fn course_run_key_with_reserved_characters_stays_one_segment() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/courses/v1/courses/course-v1:org.1+Demo+Run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "course-v1:org.1+Demo+Run",
            "start": "2026-01-15T12:00:00Z"
        })))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(
            "/api/courses/v1/courses/course-v1:org.1+Demo+Run%3Fother%23x",
        ))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, None);
    let run = client
        .courses()
        .get("course-v1:org.1+Demo+Run?other#x")
        .await
        .unwrap();
    assert!(run.is_none());
}

#[tokio::test]
async fn course_run_slashed_key_is_encoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/courses/v1/courses/org.1%2FDemo%2FRun"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "org.1/Demo/Run",
            "start": "2014-09-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, None);
    let run = client
        .courses()
        .get("org.1/Demo/Run")
        .await
        .unwrap()
        .expect("slashed key should resolve");
    assert_eq!(run.id, "org.1/Demo/Run");
}
