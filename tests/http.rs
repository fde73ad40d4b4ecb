use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use examshelf::app;
use examshelf::config::Auth;
use examshelf::db::Database;
use examshelf::handler::AppState;
use examshelf::model::{ExamId, NewExam, UserId};
use serde_json::{Value, json};
use tower::ServiceExt;

struct Harness {
    app: Router,
    db: Arc<Database>,
    user: UserId,
    token: String,
    exam: ExamId,
}

async fn setup() -> Harness {
    let db = Arc::new(Database::in_memory().await.unwrap());
    let user = db.create_user("student@example.com", Some("Student")).await.unwrap();
    let token = db.create_session(&user, chrono::Duration::hours(1)).await.unwrap();
    let exam = db
        .create_exam(NewExam {
            title: "Operating Systems Midterm".to_string(),
            course_name: "Operating Systems".to_string(),
            has_answers: true,
            ..Default::default()
        })
        .await
        .unwrap();

    Harness {
        app: app(AppState::new(db.clone(), Auth::default())),
        db,
        user,
        token,
        exam,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("session={token}"));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn healthcheck_is_public() {
    let h = setup().await;
    let (status, _, body) = send(&h.app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "ok");
}

#[tokio::test]
async fn anonymous_visitors_can_read_exams() {
    let h = setup().await;
    let (status, _, body) = send(&h.app, get(&format!("/api/exams/{}", h.exam))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Operating Systems Midterm");
    assert_eq!(body["data"]["hasAnswers"], true);
    assert_eq!(body["data"]["isSaved"], false);
    assert_eq!(body["data"]["isFlashed"], false);
    assert_eq!(body["data"]["savedInFolders"], json!([]));
}

#[tokio::test]
async fn unknown_exam_is_404() {
    let h = setup().await;
    let (status, _, body) = send(&h.app, get("/api/exams/doesnotexist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "exam not found");
}

#[tokio::test]
async fn writes_without_a_session_ask_to_log_in() {
    let h = setup().await;
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/exams/{}/flash", h.exam))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "請先登入");

    let exam = h.db.as_ref();
    let stored = examshelf::store::ItemStore::find_exam(exam, &h.exam).await.unwrap().unwrap();
    assert_eq!(stored.lightning, 0);
}

#[tokio::test]
async fn expired_sessions_are_rejected() {
    let h = setup().await;
    let stale = h
        .db
        .create_session(&h.user, chrono::Duration::minutes(-5))
        .await
        .unwrap();
    let (status, _, body) = send(&h.app, authed("POST", &format!("/api/exams/{}/save", h.exam), &stale, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "請先登入");
}

#[tokio::test]
async fn pages_redirect_to_login_with_callback() {
    let h = setup().await;
    let (status, headers, _) = send(&h.app, get("/user?tab=saved")).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        headers.get(header::LOCATION).unwrap(),
        "/login?callbackUrl=%2Fuser%3Ftab%3Dsaved"
    );
}

#[tokio::test]
async fn login_prompt_points_at_the_provider() {
    let h = setup().await;
    let (status, _, body) = send(&h.app, get("/login?callbackUrl=%2Fexam%2Fabc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["provider"], "google");
    assert_eq!(body["data"]["label"], "立即登入");
    assert_eq!(
        body["data"]["signinUrl"],
        "/api/auth/signin/google?callbackUrl=%2Fexam%2Fabc"
    );

    for foreign in ["https%3A%2F%2Fevil.example", "%2F%5Cevil.example"] {
        let (_, _, body) = send(&h.app, get(&format!("/login?callbackUrl={foreign}"))).await;
        assert_eq!(body["data"]["signinUrl"], "/api/auth/signin/google?callbackUrl=%2F");
    }
}

#[tokio::test]
async fn flash_then_view_as_owner() {
    let h = setup().await;
    let (status, _, body) = send(
        &h.app,
        authed("POST", &format!("/api/exams/{}/flash", h.exam), &h.token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isFlashed"], true);
    assert_eq!(body["data"]["lightning"], 1);

    let req = Request::builder()
        .uri(format!("/api/exams/{}", h.exam))
        .header(header::AUTHORIZATION, format!("Bearer {}", h.token))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isFlashed"], true);
    assert_eq!(body["data"]["lightning"], 1);
}

#[tokio::test]
async fn folders_round_trip_through_the_profile() {
    let h = setup().await;

    let (status, _, body) = send(
        &h.app,
        authed("POST", "/api/folders", &h.token, Some(json!({ "name": "Finals" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let folder_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &h.app,
        authed(
            "PUT",
            &format!("/api/exams/{}/folders", h.exam),
            &h.token,
            Some(json!({ "folderIds": [folder_id] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isSaved"], true);
    assert_eq!(body["data"]["savedInFolders"], json!([folder_id]));

    let (status, _, body) = send(&h.app, authed("GET", "/api/me", &h.token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["savedExams"], json!([h.exam.as_str()]));
    assert_eq!(body["data"]["folders"][0]["name"], "Finals");
    assert_eq!(body["data"]["folders"][0]["exams"], json!([h.exam.as_str()]));

    // Unsave cascades out of the folder.
    let (status, _, body) = send(
        &h.app,
        authed("POST", &format!("/api/exams/{}/save", h.exam), &h.token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isSaved"], false);

    let (_, _, body) = send(&h.app, authed("GET", "/api/me", &h.token, None)).await;
    assert_eq!(body["data"]["savedExams"], json!([]));
    assert_eq!(body["data"]["folders"][0]["exams"], json!([]));
}

#[tokio::test]
async fn blank_folder_names_are_rejected() {
    let h = setup().await;
    let (status, _, body) = send(
        &h.app,
        authed("POST", "/api/folders", &h.token, Some(json!({ "name": "   " }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("folder name"));
}

#[tokio::test]
async fn toggling_a_missing_exam_is_404() {
    let h = setup().await;
    let (status, _, body) = send(
        &h.app,
        authed("POST", "/api/exams/nope/flash", &h.token, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "exam not found");
}
