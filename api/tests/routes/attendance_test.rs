use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, SecondsFormat, Utc};
use db::models::user::{Model as User, Role};
use db::test_utils::seed_user;
use serde_json::{Value, json};
use serial_test::serial;

use crate::helpers::{bearer, make_test_app, send};

fn get(uri: &str, user: &User) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, user: &User, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn rfc3339(offset: Duration) -> String {
    (Utc::now() + offset).to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[tokio::test]
#[serial]
async fn warden_creates_session_with_defaults() {
    let (app, db) = make_test_app().await;
    let warden = seed_user(&db, "warden", Role::Warden).await;

    let (status, json) = send(&app, post("/api/attendance/sessions", &warden, json!({}))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Attendance session created");
    let session = &json["data"]["session"];
    assert_eq!(session["title"], "Daily Attendance");
    assert_eq!(session["duration_hours"], 24.0);
    assert_eq!(session["late_after_minutes"], 480);
    assert_eq!(session["active"], true);
    assert_eq!(session["state"], "open");
    assert_eq!(session["created_by"], warden.id);

    let id = session["id"].as_i64().unwrap();
    assert_eq!(json["data"]["proof"]["session_id"], id);
    assert_eq!(
        json["data"]["proof"]["payload"],
        format!(r#"{{"session_id":{id}}}"#)
    );
    assert!(
        json["data"]["proof"]["qr_code"]
            .as_str()
            .unwrap()
            .starts_with("data:image/svg+xml;base64,")
    );
}

#[tokio::test]
#[serial]
async fn session_creation_requires_elevated_role_and_valid_input() {
    let (app, db) = make_test_app().await;
    let warden = seed_user(&db, "warden", Role::Warden).await;
    let student = seed_user(&db, "asha", Role::Student).await;

    let (status, json) = send(&app, post("/api/attendance/sessions", &student, json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["success"], false);

    let req = Request::builder()
        .method("POST")
        .uri("/api/attendance/sessions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(
        &app,
        post(
            "/api/attendance/sessions",
            &warden,
            json!({ "late_after_minutes": -5 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "late_after_minutes must not be negative");

    let (status, json) = send(
        &app,
        post(
            "/api/attendance/sessions",
            &warden,
            json!({ "start_at": rfc3339(Duration::hours(1)), "expires_at": rfc3339(Duration::zero()) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "expires_at must be after start_at");
}

#[tokio::test]
#[serial]
async fn check_in_with_proof_then_repeat_is_already_marked() {
    let (app, db) = make_test_app().await;
    let warden = seed_user(&db, "warden", Role::Warden).await;
    let student = seed_user(&db, "asha", Role::Student).await;

    let (_, created) = send(&app, post("/api/attendance/sessions", &warden, json!({}))).await;
    let payload = created["data"]["proof"]["payload"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        post("/api/attendance/check-in", &student, json!({ "proof": payload })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "present");
    assert_eq!(json["data"]["already_marked"], false);
    assert_eq!(json["message"], "Attendance marked as present");
    let first_time = json["data"]["time"].clone();
    assert!(first_time.is_string());

    // decoded proof object, as some scanners hand it over
    let (status, json) = send(
        &app,
        post(
            "/api/attendance/check-in",
            &student,
            json!({ "proof": serde_json::from_str::<Value>(&payload).unwrap() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["already_marked"], true);
    assert_eq!(json["data"]["status"], "present");
    assert_eq!(json["data"]["time"], first_time);
    assert_eq!(json["message"], "Attendance already marked for this session");
}

#[tokio::test]
#[serial]
async fn check_in_reports_late_and_closed_sessions() {
    let (app, db) = make_test_app().await;
    let warden = seed_user(&db, "warden", Role::Warden).await;
    let student = seed_user(&db, "asha", Role::Student).await;

    let (_, late) = send(
        &app,
        post(
            "/api/attendance/sessions",
            &warden,
            json!({
                "start_at": rfc3339(-Duration::hours(2)),
                "duration_hours": 3,
                "late_after_minutes": 30
            }),
        ),
    )
    .await;
    let late_id = late["data"]["session"]["id"].as_i64().unwrap();

    let (status, json) = send(
        &app,
        post("/api/attendance/check-in", &student, json!({ "session_id": late_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "late");

    let (_, expired) = send(
        &app,
        post(
            "/api/attendance/sessions",
            &warden,
            json!({ "start_at": rfc3339(-Duration::hours(2)), "duration_hours": 1 }),
        ),
    )
    .await;
    assert_eq!(expired["data"]["session"]["state"], "closed_pending_reconciliation");
    let expired_id = expired["data"]["session"]["id"].as_i64().unwrap();

    let (status, json) = send(
        &app,
        post(
            "/api/attendance/check-in",
            &student,
            json!({ "session_id": expired_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["message"],
        format!("Attendance session {expired_id} is expired")
    );
}

#[tokio::test]
#[serial]
async fn check_in_rejects_bad_requests() {
    let (app, db) = make_test_app().await;
    let student = seed_user(&db, "asha", Role::Student).await;

    let (status, json) = send(&app, post("/api/attendance/check-in", &student, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Either session_id or proof is required");

    let (status, json) = send(
        &app,
        post(
            "/api/attendance/check-in",
            &student,
            json!({ "proof": "definitely not a qr payload" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        json["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid attendance proof")
    );

    let (status, json) = send(
        &app,
        post("/api/attendance/check-in", &student, json!({ "session_id": 4242 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Attendance session 4242 not found");
}

#[tokio::test]
#[serial]
async fn check_in_with_token_for_missing_user_is_forbidden() {
    let (app, db) = make_test_app().await;
    let warden = seed_user(&db, "warden", Role::Warden).await;
    let student = seed_user(&db, "asha", Role::Student).await;
    let ghost = User {
        id: 77_777,
        ..student
    };

    let (_, created) = send(&app, post("/api/attendance/sessions", &warden, json!({}))).await;
    let id = created["data"]["session"]["id"].as_i64().unwrap();

    let (status, json) = send(
        &app,
        post("/api/attendance/check-in", &ghost, json!({ "session_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["success"], false);

    let (_, records) = send(
        &app,
        get(&format!("/api/attendance/sessions/{id}/records"), &warden),
    )
    .await;
    assert_eq!(records["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
#[serial]
async fn session_reads_respect_roles() {
    let (app, db) = make_test_app().await;
    let warden = seed_user(&db, "warden", Role::Warden).await;
    let admin = seed_user(&db, "admin", Role::Admin).await;
    let student = seed_user(&db, "asha", Role::Student).await;

    let (_, created) = send(
        &app,
        post(
            "/api/attendance/sessions",
            &warden,
            json!({ "title": "Night roll call" }),
        ),
    )
    .await;
    let id = created["data"]["session"]["id"].as_i64().unwrap();
    send(
        &app,
        post("/api/attendance/check-in", &student, json!({ "session_id": id })),
    )
    .await;

    // anyone signed in may read the session itself
    let (status, json) = send(&app, get(&format!("/api/attendance/sessions/{id}"), &student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["title"], "Night roll call");
    assert_eq!(json["data"]["creator"]["email"], "warden@hostel.test");

    let (status, _) = send(
        &app,
        get(&format!("/api/attendance/sessions/{id}/proof"), &student),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = send(
        &app,
        get(&format!("/api/attendance/sessions/{id}/proof"), &admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["session_id"], id);
    assert!(json["data"]["qr_code"].as_str().is_some_and(|qr| !qr.is_empty()));

    let (status, _) = send(&app, get("/api/attendance/sessions", &student)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = send(
        &app,
        get("/api/attendance/sessions?page=1&per_page=10&q=night", &warden),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["sessions"][0]["id"], id);

    let (status, _) = send(&app, get("/api/attendance/sessions?per_page=0", &warden)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        get("/api/attendance/sessions?page=18446744073709551615", &warden),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        get(&format!("/api/attendance/sessions/{id}/records"), &warden),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = json["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["user_id"], student.id);
    assert_eq!(records[0]["user_name"], "asha");
    assert_eq!(records[0]["status"], "present");

    let (status, _) = send(&app, get("/api/attendance/sessions/999", &student)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn summaries_are_scoped_to_the_caller_for_students() {
    let (app, db) = make_test_app().await;
    let warden = seed_user(&db, "warden", Role::Warden).await;
    let student = seed_user(&db, "asha", Role::Student).await;
    let other = seed_user(&db, "ben", Role::Student).await;

    let (_, created) = send(&app, post("/api/attendance/sessions", &warden, json!({}))).await;
    let id = created["data"]["session"]["id"].as_i64().unwrap();
    send(
        &app,
        post("/api/attendance/check-in", &student, json!({ "session_id": id })),
    )
    .await;

    let (status, json) = send(&app, get("/api/attendance/me/summary", &student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user_id"], student.id);
    assert_eq!(json["data"]["days"], 30);
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["present"], 1);
    assert_eq!(json["data"]["attendance_percentage"], 100);

    let (status, _) = send(
        &app,
        get(&format!("/api/attendance/users/{}/summary", other.id), &student),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &app,
        get(
            &format!("/api/attendance/users/{}/summary?days=7", student.id),
            &warden,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["days"], 7);
    assert_eq!(json["data"]["present"], 1);

    let (status, _) = send(&app, get("/api/attendance/me/summary?days=0", &student)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
