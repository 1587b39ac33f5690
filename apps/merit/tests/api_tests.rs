//! Integration tests for the merit HTTP API.
//!
//! Uses axum-test to drive the router without binding a socket. Every
//! server gets fresh in-memory stores and a small directory:
//!
//! - `u-s1` is student `S-01`, advised by `L-01`
//! - `u-s2` is student `S-02`, advised by `L-02`
//! - `u-l1` / `u-l2` are lecturers `L-01` / `L-02`

#![allow(clippy::unwrap_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::{TestRequest, TestServer};
use merit::api::{AppState, ErrorResponse, HealthResponse, create_router};
use merit::config::{SecurityConfig, TimeoutConfig};
use merit::service::AchievementService;
use merit_core::directory::{LecturerEntry, StudentEntry};
use merit_core::{
    AchievementWorkflow, DirectorySeed, LecturerId, MemoryDetailStore, MemoryDirectory,
    MemoryReferenceStore, StudentId, UserId,
};
use serde_json::{Value, json};
use std::sync::Arc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn seed() -> DirectorySeed {
    DirectorySeed {
        students: vec![
            StudentEntry {
                id: StudentId::new("S-01"),
                user_id: UserId::new("u-s1"),
                advisor: Some(LecturerId::new("L-01")),
            },
            StudentEntry {
                id: StudentId::new("S-02"),
                user_id: UserId::new("u-s2"),
                advisor: Some(LecturerId::new("L-02")),
            },
        ],
        lecturers: vec![
            LecturerEntry {
                id: LecturerId::new("L-01"),
                user_id: UserId::new("u-l1"),
            },
            LecturerEntry {
                id: LecturerId::new("L-02"),
                user_id: UserId::new("u-l2"),
            },
        ],
    }
}

fn server_with(security: SecurityConfig) -> TestServer {
    let workflow = AchievementWorkflow::new(
        Arc::new(MemoryReferenceStore::new()),
        Arc::new(MemoryDetailStore::new()),
        Arc::new(MemoryDirectory::from_seed(seed()).unwrap()),
    );
    let service = AchievementService::new(workflow, &TimeoutConfig::default());
    TestServer::new(create_router(AppState::new(service), &security)).unwrap()
}

fn create_test_server() -> TestServer {
    server_with(SecurityConfig {
        rate_limit: 0,
        ..SecurityConfig::default()
    })
}

fn as_user(request: TestRequest, user: &str, role: &str) -> TestRequest {
    request
        .add_header(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_str(user).unwrap(),
        )
        .add_header(
            HeaderName::from_static("x-user-role"),
            HeaderValue::from_str(role).unwrap(),
        )
}

fn student(request: TestRequest) -> TestRequest {
    as_user(request, "u-s1", "Mahasiswa")
}

fn advisor(request: TestRequest) -> TestRequest {
    as_user(request, "u-l1", "Dosen Wali")
}

fn admin(request: TestRequest) -> TestRequest {
    as_user(request, "u-admin", "Admin")
}

fn content(title: &str) -> Value {
    json!({
        "achievementType": "competition",
        "title": title,
        "description": "First place",
        "details": {"competitionLevel": "national"},
        "tags": ["robotics"],
        "points": 50
    })
}

/// Create an achievement as `u-s1` and return its reference id.
async fn create_achievement(server: &TestServer, title: &str) -> String {
    let response = student(server.post("/achievements")).json(&content(title)).await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["data"]["reference"]["id"].as_str().unwrap().to_string()
}

async fn submitted_achievement(server: &TestServer, title: &str) -> String {
    let id = create_achievement(server, title).await;
    student(server.post(&format!("/achievements/{}/submit", id)))
        .await
        .assert_status_ok();
    id
}

fn error_of(response: &axum_test::TestResponse) -> ErrorResponse {
    response.json()
}

// =============================================================================
// HEALTH AND IDENTITY
// =============================================================================

#[tokio::test]
async fn test_health_needs_no_identity() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let server = create_test_server();

    let response = server.get("/achievements").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let error = error_of(&response);
    assert!(!error.success);
    assert_eq!(error.code, "unauthenticated");
}

#[tokio::test]
async fn test_unknown_role_is_forbidden() {
    let server = create_test_server();

    let response = as_user(server.get("/achievements"), "u-x", "Visitor").await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(error_of(&response).code, "forbidden");
}

#[tokio::test]
async fn test_permission_header_narrows_defaults() {
    let server = create_test_server();

    let response = student(server.post("/achievements"))
        .add_header(
            HeaderName::from_static("x-user-permissions"),
            HeaderValue::from_static("achievement:read"),
        )
        .json(&content("Hackathon"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_create_returns_draft_with_content() {
    let server = create_test_server();

    let response = student(server.post("/achievements"))
        .json(&content("Robotics cup"))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["reference"]["status"], "draft");
    assert_eq!(body["data"]["reference"]["student_id"], "S-01");
    assert_eq!(body["data"]["detail"]["title"], "Robotics cup");
    assert_eq!(body["data"]["detail"]["studentId"], "S-01");
    assert_eq!(
        body["data"]["reference"]["detail_ref"],
        body["data"]["detail"]["id"]
    );
}

#[tokio::test]
async fn test_submit_then_verify() {
    let server = create_test_server();
    let id = submitted_achievement(&server, "Robotics cup").await;

    let response = advisor(server.post(&format!("/achievements/{}/verify", id))).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "verified");
    assert_eq!(body["data"]["verified_by"], "L-01");

    let fetched: Value = student(server.get(&format!("/achievements/{}", id)))
        .await
        .json();
    assert_eq!(fetched["data"]["reference"]["status"], "verified");
}

#[tokio::test]
async fn test_verify_twice_is_invalid_state() {
    let server = create_test_server();
    let id = submitted_achievement(&server, "Robotics cup").await;
    advisor(server.post(&format!("/achievements/{}/verify", id)))
        .await
        .assert_status_ok();

    let response = advisor(server.post(&format!("/achievements/{}/verify", id))).await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_of(&response).code, "invalid_state");
}

#[tokio::test]
async fn test_reject_requires_note() {
    let server = create_test_server();
    let id = submitted_achievement(&server, "Debate").await;

    let response = advisor(server.post(&format!("/achievements/{}/reject", id)))
        .json(&json!({"rejection_note": "   "}))
        .await;

    response.assert_status_bad_request();
    let error = error_of(&response);
    assert_eq!(error.code, "validation_error");
    assert_eq!(error.field.as_deref(), Some("rejection_note"));
}

#[tokio::test]
async fn test_reject_edit_resubmit_history() {
    let server = create_test_server();
    let id = submitted_achievement(&server, "Debate").await;

    let rejected: Value = advisor(server.post(&format!("/achievements/{}/reject", id)))
        .json(&json!({"rejection_note": "certificate missing"}))
        .await
        .json();
    assert_eq!(rejected["data"]["status"], "rejected");
    assert_eq!(rejected["data"]["rejection_note"], "certificate missing");

    let history: Value = student(server.get(&format!("/achievements/{}/history", id)))
        .await
        .json();
    let milestones: Vec<&str> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["milestone"].as_str().unwrap())
        .collect();
    assert_eq!(milestones, vec!["created", "submitted", "rejected"]);

    student(server.put(&format!("/achievements/{}", id)))
        .json(&content("Debate (with certificate)"))
        .await
        .assert_status_ok();

    let resubmitted: Value = student(server.post(&format!("/achievements/{}/submit", id)))
        .await
        .json();
    assert_eq!(resubmitted["data"]["status"], "submitted");
    assert!(resubmitted["data"]["rejection_note"].is_null());
}

#[tokio::test]
async fn test_edit_after_verify_is_invalid_state() {
    let server = create_test_server();
    let id = submitted_achievement(&server, "Robotics cup").await;
    advisor(server.post(&format!("/achievements/{}/verify", id)))
        .await
        .assert_status_ok();

    let response = student(server.put(&format!("/achievements/{}", id)))
        .json(&content("Rewritten"))
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_hides_achievement() {
    let server = create_test_server();
    let id = create_achievement(&server, "Volunteering").await;

    let deleted: Value = student(server.delete(&format!("/achievements/{}", id)))
        .await
        .json();
    assert_eq!(deleted["data"]["status"], "deleted");

    student(server.get(&format!("/achievements/{}", id)))
        .await
        .assert_status_not_found();
    let listed: Value = student(server.get("/achievements")).await.json();
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_attachment_is_appended() {
    let server = create_test_server();
    let id = create_achievement(&server, "Paper").await;

    let response = student(server.post(&format!("/achievements/{}/attachments", id)))
        .json(&json!({
            "file_name": "certificate.pdf",
            "url": "/uploads/certificate.pdf",
            "mime_type": "application/pdf"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let attachments = body["data"]["detail"]["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0]["fileName"], "certificate.pdf");
}

// =============================================================================
// VISIBILITY
// =============================================================================

#[tokio::test]
async fn test_advisor_sees_only_submitted_advisee_work() {
    let server = create_test_server();
    create_achievement(&server, "Still a draft").await;
    let submitted = submitted_achievement(&server, "Ready").await;

    let listed: Value = advisor(server.get("/achievements")).await.json();
    let ids: Vec<&str> = listed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["reference"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![submitted.as_str()]);

    let other: Value = as_user(server.get("/achievements"), "u-l2", "Dosen Wali")
        .await
        .json();
    assert!(other["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_other_advisor_cannot_verify() {
    let server = create_test_server();
    let id = submitted_achievement(&server, "Ready").await;

    let response = as_user(
        server.post(&format!("/achievements/{}/verify", id)),
        "u-l2",
        "Dosen Wali",
    )
    .await;

    assert!(matches!(
        response.status_code(),
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
    ));
}

#[tokio::test]
async fn test_student_cannot_read_someone_elses() {
    let server = create_test_server();
    let id = create_achievement(&server, "Mine").await;

    as_user(server.get(&format!("/achievements/{}", id)), "u-s2", "Mahasiswa")
        .await
        .assert_status_not_found();
}

// =============================================================================
// INPUT ERRORS
// =============================================================================

#[tokio::test]
async fn test_malformed_id_is_validation_error() {
    let server = create_test_server();

    let response = student(server.get("/achievements/not-a-uuid")).await;

    response.assert_status_bad_request();
    assert_eq!(error_of(&response).field.as_deref(), Some("id"));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let server = create_test_server();

    let response = student(server.get("/achievements/00000000-0000-4000-8000-000000000000")).await;

    response.assert_status_not_found();
    assert_eq!(error_of(&response).code, "not_found");
}

#[tokio::test]
async fn test_empty_title_names_field() {
    let server = create_test_server();

    let response = student(server.post("/achievements"))
        .json(&content("   "))
        .await;

    response.assert_status_bad_request();
    assert_eq!(error_of(&response).field.as_deref(), Some("title"));
}

#[tokio::test]
async fn test_unparsable_body_is_validation_error() {
    let server = create_test_server();

    let response = student(server.post("/achievements"))
        .json(&json!({"points": "many"}))
        .await;

    response.assert_status_bad_request();
    let error = error_of(&response);
    assert_eq!(error.code, "validation_error");
    assert_eq!(error.field.as_deref(), Some("body"));
}

// =============================================================================
// REPORTS AND ADMIN
// =============================================================================

#[tokio::test]
async fn test_statistics_group_by_type_and_level() {
    let server = create_test_server();
    create_achievement(&server, "One").await;
    create_achievement(&server, "Two").await;

    let response = admin(server.get("/reports/statistics")).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["total_points"], 100);
    assert_eq!(body["data"]["by_type"]["competition"], 2);
    assert_eq!(body["data"]["by_type_and_level"]["competition"]["national"], 2);
}

#[tokio::test]
async fn test_student_report_scoping() {
    let server = create_test_server();
    create_achievement(&server, "One").await;

    let own: Value = student(server.get("/reports/student/S-01")).await.json();
    assert_eq!(own["data"]["statistics"]["total"], 1);

    student(server.get("/reports/student/S-02"))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    as_user(server.get("/reports/student/S-01"), "u-l2", "Dosen Wali")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_consistency_is_admin_only() {
    let server = create_test_server();
    create_achievement(&server, "One").await;

    student(server.get("/admin/consistency"))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = admin(server.get("/admin/consistency")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["references_scanned"], 1);
    assert!(body["data"]["orphaned_details"].as_array().unwrap().is_empty());
}

// =============================================================================
// SERVICE KEY
// =============================================================================

#[tokio::test]
async fn test_api_key_guards_everything_but_health() {
    let server = server_with(SecurityConfig {
        api_key: Some("test-secret-key-12345".to_string()),
        rate_limit: 0,
        cors_origins: None,
    });

    server.get("/health").await.assert_status_ok();

    student(server.get("/achievements"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    student(server.get("/achievements"))
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer wrong-key"),
        )
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    student(server.get("/achievements"))
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer test-secret-key-12345"),
        )
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_rate_limit_rejects_burst() {
    let server = server_with(SecurityConfig {
        api_key: None,
        rate_limit: 1,
        cors_origins: None,
    });

    server.get("/health").await.assert_status_ok();
    let response = server.get("/health").await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_of(&response).code, "rate_limited");
}
