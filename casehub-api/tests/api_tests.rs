//! Integration tests for the CaseHub API
//!
//! Each test spins up the full router against an in-memory database and
//! drives it through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::json;
use sha2::Sha256;
use tower::util::ServiceExt;
use uuid::Uuid;

use casehub_api::db::sessions::{self, SessionKind, SessionRecord};
use casehub_api::{build_router, AppState};
use casehub_common::auth::TokenCodec;
use casehub_common::config::Config;
use casehub_common::db::init::init_memory_database;
use casehub_common::time::now_ms;

const WEBHOOK_SECRET: &str = "test_webhook_secret";

async fn create_test_app() -> (axum::Router, sqlx::SqlitePool) {
    let pool = init_memory_database()
        .await
        .expect("Failed to create in-memory database");

    let mut config = Config::default();
    config.razorpay.webhook_secret = WEBHOOK_SECRET.to_string();

    let state = AppState::new(pool.clone(), TokenCodec::with_random_key(), config);
    (build_router(state), pool)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn post_json_authed(uri: &str, body: &serde_json::Value, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_authed(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Register and log in a user, returning (user_id, access_token, refresh_token)
async fn register_and_login(app: &axum::Router, email: &str, mobile: &str) -> (String, String, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            &json!({
                "email": email,
                "password": "hunter2hunter2",
                "name": "Test User",
                "mobile_number": mobile,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let user_id = body_json(response).await["user_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            &json!({ "identifier": email, "password": "hunter2hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    (
        user_id,
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

/// Insert a lecture directly, bypassing the HTTP layer
async fn seed_lecture(pool: &sqlx::SqlitePool, title: &str, is_free: bool, created_at: i64) -> String {
    let mut record = SessionRecord::blank(
        SessionKind::Vimeo,
        Uuid::new_v4().to_string(),
        title.to_string(),
        created_at,
    );
    record.is_free = is_free;
    record.module_name = Some("Neuro".to_string());
    record.video_url = Some("https://player.example/v/123".to_string());
    sessions::insert(pool, &record).await.unwrap();
    record.guid
}

async fn seed_case(pool: &sqlx::SqlitePool, title: &str, is_free: bool, created_at: i64) -> String {
    let mut record = SessionRecord::blank(
        SessionKind::Dicom,
        Uuid::new_v4().to_string(),
        title.to_string(),
        created_at,
    );
    record.is_free = is_free;
    record.dicom_case_video_url = Some("https://cdn.example/case.mp4".to_string());
    sessions::insert(pool, &record).await.unwrap();
    record.guid
}

/// Give a user an active subscription directly
async fn seed_subscription(pool: &sqlx::SqlitePool, user_id: &str) {
    sqlx::query(
        "INSERT INTO subscriptions
             (guid, subscriber_name, subscriber_id, package_name, package_id,
              status, subscription_date, expiry_date, payment_gateway)
         VALUES (?, 'Test User', ?, 'Annual', 'pkg-1', 'active', ?, ?, 'razorpay')",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(now_ms())
    .bind(now_ms() + 86_400_000)
    .execute(pool)
    .await
    .unwrap();
}

// ========================================
// Health / auth
// ========================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool) = create_test_app().await;
    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "casehub-api");
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let (app, _pool) = create_test_app().await;

    // Bad email
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            &json!({
                "email": "not-an-email",
                "password": "hunter2hunter2",
                "name": "X",
                "mobile_number": "9876543210",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Short password
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            &json!({
                "email": "a@b.co",
                "password": "short",
                "name": "X",
                "mobile_number": "9876543210",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Bad mobile
    let response = app
        .oneshot(post_json(
            "/api/auth/register",
            &json!({
                "email": "a@b.co",
                "password": "hunter2hunter2",
                "name": "X",
                "mobile_number": "12345",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let (app, _pool) = create_test_app().await;
    register_and_login(&app, "dup@example.com", "9876543210").await;

    let response = app
        .oneshot(post_json(
            "/api/auth/register",
            &json!({
                "email": "dup@example.com",
                "password": "hunter2hunter2",
                "name": "Other",
                "mobile_number": "9876543211",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_with_mobile_and_bad_password() {
    let (app, _pool) = create_test_app().await;
    register_and_login(&app, "mob@example.com", "9000000001").await;

    // Mobile number works as the identifier
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            &json!({ "identifier": "9000000001", "password": "hunter2hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            "/api/auth/login",
            &json!({ "identifier": "mob@example.com", "password": "wrong-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_flow() {
    let (app, _pool) = create_test_app().await;
    let (_, _, refresh_token) = register_and_login(&app, "r@example.com", "9000000002").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/refresh",
            &json!({ "refresh_token": refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["access_token"].is_string());

    let response = app
        .oneshot(post_json(
            "/api/auth/refresh",
            &json!({ "refresh_token": "garbage" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_access_token_rejected_as_refresh_token() {
    let (app, _pool) = create_test_app().await;
    let (_, access_token, _) = register_and_login(&app, "k@example.com", "9000000003").await;

    let response = app
        .oneshot(post_json(
            "/api/auth/refresh",
            &json!({ "refresh_token": access_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ========================================
// Session catalog + access control
// ========================================

#[tokio::test]
async fn test_create_session_requires_auth() {
    let (app, _pool) = create_test_app().await;
    let response = app
        .oneshot(post_json(
            "/api/sessions/create",
            &json!({ "session_type": "Vimeo", "title": "No token" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_fetch_session() {
    let (app, _pool) = create_test_app().await;
    let (_, token, _) = register_and_login(&app, "c@example.com", "9000000004").await;

    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/sessions/create",
            &json!({
                "session_type": "Vimeo",
                "title": "Chest basics",
                "module_name": "Chest",
                "difficulty": "beginner",
                "is_free": true,
                "video_url": "https://player.example/v/9",
            }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/api/sessions/get?session_type=Vimeo"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["data"][0]["title"], "Chest basics");
}

#[tokio::test]
async fn test_create_session_validation() {
    let (app, _pool) = create_test_app().await;
    let (_, token, _) = register_and_login(&app, "v@example.com", "9000000005").await;

    // Unknown discriminator
    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/sessions/create",
            &json!({ "session_type": "Webinar", "title": "X" }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Live programs need dates
    let response = app
        .oneshot(post_json_authed(
            "/api/sessions/create",
            &json!({ "session_type": "Live", "title": "X" }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_guest_gets_free_limit_unlocked() {
    let (app, pool) = create_test_app().await;
    for i in 0..4 {
        seed_lecture(&pool, &format!("free {}", i), true, 1000 + i).await;
    }
    seed_lecture(&pool, "paid", false, 2000).await;

    let response = app
        .oneshot(get_request("/api/sessions/get?session_type=Vimeo&limit=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 5);

    // Default free limit is 2
    let unlocked: Vec<_> = data.iter().filter(|s| s["is_locked"] == false).collect();
    assert_eq!(unlocked.len(), 2);
    for session in &unlocked {
        assert_eq!(session["access_level"], "guest");
        assert_eq!(session["is_free"], true);
    }

    // Locked entries are sanitized and carry the login prompt
    let locked: Vec<_> = data.iter().filter(|s| s["is_locked"] == true).collect();
    assert_eq!(locked.len(), 3);
    for session in &locked {
        assert_eq!(session["lock_reason"], "Please login to access more content");
        assert!(session.get("video_url").is_none());
    }

    // Unlocked precede locked
    assert_eq!(data[0]["is_locked"], false);
    assert_eq!(data[1]["is_locked"], false);
    assert_eq!(data[2]["is_locked"], true);
}

#[tokio::test]
async fn test_logged_in_gets_bonus_allowance() {
    let (app, pool) = create_test_app().await;
    for i in 0..7 {
        seed_lecture(&pool, &format!("free {}", i), true, 1000 + i).await;
    }
    let (_, token, _) = register_and_login(&app, "li@example.com", "9000000006").await;

    let response = app
        .oneshot(get_authed("/api/sessions/get?session_type=Vimeo&limit=20", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();

    // free_limit 2 + login bonus 3
    let unlocked = data.iter().filter(|s| s["is_locked"] == false).count();
    assert_eq!(unlocked, 5);
    let locked: Vec<_> = data.iter().filter(|s| s["is_locked"] == true).collect();
    assert_eq!(locked.len(), 2);
    assert_eq!(locked[0]["lock_reason"], "Subscribe to access this content");
    assert_eq!(locked[0]["access_level"], "logged_in");
}

#[tokio::test]
async fn test_subscriber_sees_everything_unlocked() {
    let (app, pool) = create_test_app().await;
    seed_lecture(&pool, "free", true, 1000).await;
    seed_lecture(&pool, "paid1", false, 1001).await;
    seed_lecture(&pool, "paid2", false, 1002).await;
    let (user_id, token, _) = register_and_login(&app, "s@example.com", "9000000007").await;
    seed_subscription(&pool, &user_id).await;

    let response = app
        .oneshot(get_authed("/api/sessions/get?session_type=Vimeo", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    for session in data {
        assert_eq!(session["is_locked"], false);
        assert_eq!(session["access_level"], "subscribed");
        assert!(session["video_url"].is_string());
    }
}

#[tokio::test]
async fn test_expired_subscription_downgrades() {
    let (app, pool) = create_test_app().await;
    seed_lecture(&pool, "paid", false, 1000).await;
    let (user_id, token, _) = register_and_login(&app, "x@example.com", "9000000008").await;

    // Subscription that already lapsed
    sqlx::query(
        "INSERT INTO subscriptions
             (guid, subscriber_name, subscriber_id, package_name, package_id,
              status, subscription_date, expiry_date, payment_gateway)
         VALUES ('sub-old', 'X', ?, 'Annual', 'pkg-1', 'active', 0, 1, 'razorpay')",
    )
    .bind(&user_id)
    .execute(&pool)
    .await
    .unwrap();

    let response = app
        .oneshot(get_authed("/api/sessions/get?session_type=Vimeo", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["data"][0]["is_locked"], true);
    assert_eq!(json["data"][0]["access_level"], "logged_in");
}

#[tokio::test]
async fn test_merged_listing_pagination() {
    let (app, pool) = create_test_app().await;
    seed_case(&pool, "case", true, 3000).await;
    seed_lecture(&pool, "lecture", true, 2000).await;
    sqlx::query(
        "INSERT INTO live_programs
             (guid, title, module_name, start_date, end_date, created_at)
         VALUES ('lp-1', 'live', 'Neuro', 9999999999999, 9999999999999, 1000)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let response = app
        .clone()
        .oneshot(get_request("/api/sessions/get?page=1&limit=2"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["total"], 3);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    // The two newest sessions make the first page (guest shuffling may
    // reorder them within the page)
    let mut titles: Vec<&str> = data.iter().map(|s| s["title"].as_str().unwrap()).collect();
    titles.sort();
    assert_eq!(titles, vec!["case", "lecture"]);

    // A page past the end is empty, not an error
    let response = app
        .oneshot(get_request("/api/sessions/get?page=5&limit=2"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["total"], 3);
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_session() {
    let (app, pool) = create_test_app().await;
    let guid = seed_lecture(&pool, "doomed", true, 1000).await;
    let (_, token, _) = register_and_login(&app, "d@example.com", "9000000009").await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!(
            "/api/sessions/delete?session_id={}&session_type=Vimeo",
            guid
        ))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second delete finds nothing
    let request = Request::builder()
        .method("DELETE")
        .uri(format!(
            "/api/sessions/delete?session_id={}&session_type=Vimeo",
            guid
        ))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recent_items_merged_ordering() {
    let (app, pool) = create_test_app().await;
    seed_case(&pool, "old case", true, 1000).await;
    seed_lecture(&pool, "new lecture", true, 5000).await;

    // A subscriber sees the merged order untouched by gating
    let (user_id, token, _) = register_and_login(&app, "ri@example.com", "9000000019").await;
    seed_subscription(&pool, &user_id).await;

    let response = app
        .oneshot(get_authed("/api/sessions/getRecentItems", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["title"], "new lecture");
    assert_eq!(data[1]["title"], "old case");
}

#[tokio::test]
async fn test_track_and_top_watched() {
    let (app, pool) = create_test_app().await;
    let first = seed_lecture(&pool, "popular", true, 1000).await;
    let second = seed_lecture(&pool, "niche", true, 1001).await;
    let (user_id, token, _) = register_and_login(&app, "t@example.com", "9000000010").await;
    seed_subscription(&pool, &user_id).await;

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(post_json_authed(
                "/api/sessions/track",
                &json!({ "session_id": first }),
                &token,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    app.clone()
        .oneshot(post_json_authed(
            "/api/sessions/track",
            &json!({ "session_id": second }),
            &token,
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get_authed("/api/sessions/getTopWatchedSessions", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["title"], "popular");
    assert_eq!(data[0]["total_views"], 3);
    assert_eq!(data[1]["total_views"], 1);
}

// ========================================
// Playback progress
// ========================================

#[tokio::test]
async fn test_progress_save_and_get() {
    let (app, pool) = create_test_app().await;
    let session = seed_lecture(&pool, "watchable", true, 1000).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/playback-progress/save",
            &json!({
                "user_id": "u1",
                "session_id": session,
                "session_kind": "RecordedLecture",
                "current_time": 42.5,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Saving again moves the resume point (upsert, no constraint error)
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/playback-progress/save",
            &json!({
                "user_id": "u1",
                "session_id": session,
                "session_kind": "RecordedLecture",
                "current_time": 99.0,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/playback-progress/get/u1/{}",
            session
        )))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["current_time"], 99.0);

    // Unknown pairing is a fresh start, not an error
    let response = app
        .oneshot(get_request("/api/playback-progress/get/u1/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["current_time"], 0);
}

#[tokio::test]
async fn test_progress_save_unknown_session_404() {
    let (app, _pool) = create_test_app().await;
    let response = app
        .oneshot(post_json(
            "/api/playback-progress/save",
            &json!({
                "user_id": "u1",
                "session_id": "missing",
                "session_kind": "RecordedLecture",
                "current_time": 1.0,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_progress_get_all_cards() {
    let (app, pool) = create_test_app().await;
    let lecture = seed_lecture(&pool, "lecture", true, 1000).await;
    let case = seed_case(&pool, "case", true, 1001).await;

    for (id, kind, time) in [
        (&lecture, "RecordedLecture", 10.0),
        (&case, "DicomCase", 20.0),
    ] {
        app.clone()
            .oneshot(post_json(
                "/api/playback-progress/save",
                &json!({
                    "user_id": "u1",
                    "session_id": id,
                    "session_kind": kind,
                    "current_time": time,
                }),
            ))
            .await
            .unwrap();
    }
    // Force distinct watch timestamps so ordering is deterministic
    sqlx::query("UPDATE playback_progress SET last_watched_at = 1000 WHERE session_id = ?")
        .bind(&lecture)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE playback_progress SET last_watched_at = 2000 WHERE session_id = ?")
        .bind(&case)
        .execute(&pool)
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("/api/playback-progress/getAll/u1"))
        .await
        .unwrap();
    let json = body_json(response).await;
    let cards = json["data"].as_array().unwrap();
    assert_eq!(cards.len(), 2);
    // Most recently watched first
    assert_eq!(cards[0]["kind"], "Case");
    assert_eq!(cards[1]["kind"], "Lecture");
}

// ========================================
// Reviews
// ========================================

#[tokio::test]
async fn test_review_lifecycle() {
    let (app, pool) = create_test_app().await;
    let item = seed_lecture(&pool, "reviewed", true, 1000).await;
    let (user_id, token, _) = register_and_login(&app, "rev@example.com", "9000000011").await;

    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/reviews/create",
            &json!({ "item_id": item, "rating": 4, "comment": "Solid teaching case" }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let review_id = body_json(response).await["review_id"]
        .as_str()
        .unwrap()
        .to_string();

    // One review per item per user
    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/reviews/create",
            &json!({ "item_id": item, "rating": 5 }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Listing carries the reviewer name
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/reviews/get?item_id={}", item)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["data"][0]["reviewer_name"], "Test User");
    assert_eq!(json["data"][0]["rating"], 4);

    // Another user cannot edit it
    let (_, other_token, _) = register_and_login(&app, "other@example.com", "9000000012").await;
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/reviews/update/{}", review_id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", other_token))
        .body(Body::from(json!({ "rating": 1 }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner can
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/reviews/update/{}", review_id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(json!({ "rating": 5 }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!(
            "/api/reviews/getUserReview?item_id={}&user_id={}",
            item, user_id
        )))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["data"]["rating"], 5);
}

// ========================================
// Packages / payments
// ========================================

#[tokio::test]
async fn test_create_package_duration_mapping() {
    let (app, pool) = create_test_app().await;
    let (_, token, _) = register_and_login(&app, "p@example.com", "9000000013").await;

    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/subscription/createPackage",
            &json!({ "package_name": "Annual", "amount": 4999, "duration_unit": "yearly" }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let package_id = body_json(response).await["package_id"]
        .as_str()
        .unwrap()
        .to_string();

    let days: i64 = sqlx::query_scalar("SELECT duration_days FROM packages WHERE guid = ?")
        .bind(&package_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(days, 365);

    // Unknown unit is rejected
    let response = app
        .oneshot(post_json_authed(
            "/api/subscription/createPackage",
            &json!({ "package_name": "Weekly", "amount": 99, "duration_unit": "weekly" }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn sign_webhook(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

async fn seed_pending_transaction(pool: &sqlx::SqlitePool, user_id: &str, order_id: &str) {
    sqlx::query(
        "INSERT INTO packages (guid, package_name, amount, duration_days, duration_unit, created_at)
         VALUES ('pkg-1', 'Annual', 4999, 365, 'yearly', 0)",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO payment_transactions
             (guid, user_id, package_id, package_name, amount, currency,
              payment_gateway, gateway_order_id, status, created_at)
         VALUES (?, ?, 'pkg-1', 'Annual', 4999, 'INR', 'razorpay', ?, 'created', 0)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(order_id)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (app, _pool) = create_test_app().await;
    let body = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_1", "order_id": "order_1", "status": "captured"
        }}},
    })
    .to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/api/subscription/webhook")
        .header("content-type", "application/json")
        .header("X-Razorpay-Signature", "deadbeef")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_activates_subscription_once() {
    let (app, pool) = create_test_app().await;
    let (user_id, token, _) = register_and_login(&app, "w@example.com", "9000000014").await;
    seed_pending_transaction(&pool, &user_id, "order_1").await;
    seed_lecture(&pool, "paid", false, 1000).await;

    let body = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_1", "order_id": "order_1", "status": "captured"
        }}},
    })
    .to_string();
    let signature = sign_webhook(body.as_bytes());

    for _ in 0..2 {
        let request = Request::builder()
            .method("POST")
            .uri("/api/subscription/webhook")
            .header("content-type", "application/json")
            .header("X-Razorpay-Signature", &signature)
            .body(Body::from(body.clone()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Replay did not double-subscribe
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = ?")
        .bind(&user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // And the user now sees paid content unlocked
    let response = app
        .oneshot(get_authed("/api/sessions/get?session_type=Vimeo", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["data"][0]["is_locked"], false);
    assert_eq!(json["data"][0]["access_level"], "subscribed");
}

#[tokio::test]
async fn test_concurrent_webhook_deliveries_subscribe_once() {
    let (app, pool) = create_test_app().await;
    let (user_id, _, _) = register_and_login(&app, "c@example.com", "9000000023").await;
    seed_pending_transaction(&pool, &user_id, "order_c1").await;

    let body = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_c1", "order_id": "order_c1", "status": "captured"
        }}},
    })
    .to_string();
    let signature = sign_webhook(body.as_bytes());
    let request = || {
        Request::builder()
            .method("POST")
            .uri("/api/subscription/webhook")
            .header("content-type", "application/json")
            .header("X-Razorpay-Signature", &signature)
            .body(Body::from(body.clone()))
            .unwrap()
    };

    // Webhook retry racing the first delivery
    let (first, second) = tokio::join!(
        app.clone().oneshot(request()),
        app.clone().oneshot(request()),
    );
    assert_eq!(first.unwrap().status(), StatusCode::OK);
    assert_eq!(second.unwrap().status(), StatusCode::OK);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = ?")
            .bind(&user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_get_user_subscription() {
    let (app, pool) = create_test_app().await;
    let (user_id, token, _) = register_and_login(&app, "s@example.com", "9000000022").await;

    // No subscription yet
    let response = app
        .clone()
        .oneshot(get_authed("/api/subscription/getUserSubscription", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"].is_null());
    assert_eq!(json["is_active"], false);

    seed_subscription(&pool, &user_id).await;
    let response = app
        .oneshot(get_authed("/api/subscription/getUserSubscription", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["data"]["package_name"], "Annual");
    assert_eq!(json["is_active"], true);
    assert!(json["expires"].as_str().unwrap().starts_with("20"));
}

// ========================================
// Assessments
// ========================================

#[tokio::test]
async fn test_assessment_submit_grading() {
    let (app, pool) = create_test_app().await;
    let (_, token, _) = register_and_login(&app, "a@example.com", "9000000015").await;

    sqlx::query(
        "INSERT INTO assessments
             (guid, module_id, difficulty, question, option_a, option_b, option_c, option_d,
              correct_answer, created_at)
         VALUES ('q1', 'mod-1', 'beginner', 'Finding?', 'A', 'B', 'C', 'D', 'b', 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    // Correct answer earns 5 points
    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/assessments/submit",
            &json!({ "assessment_id": "q1", "selected_answer": "b" }),
            &token,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["is_correct"], true);
    assert_eq!(json["points_earned"], 5);
    assert_eq!(json["total_points"], 5);

    // Wrong answer earns nothing but still counts as an attempt
    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/assessments/submit",
            &json!({ "assessment_id": "q1", "selected_answer": "a" }),
            &token,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["is_correct"], false);
    assert_eq!(json["total_points"], 5);

    let response = app
        .oneshot(get_authed("/api/assessments/getUserPoints", &token))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["total_points"], 5);
}

#[tokio::test]
async fn test_assessment_leaderboard() {
    let (app, pool) = create_test_app().await;
    let (leader, _, _) = register_and_login(&app, "l1@example.com", "9000000016").await;
    let (runner_up, _, _) = register_and_login(&app, "l2@example.com", "9000000017").await;

    for (user, points) in [(&leader, 25), (&runner_up, 10)] {
        sqlx::query(
            "INSERT INTO assessment_progress
                 (guid, user_id, module_id, difficulty, total_questions, correct_answers, points, created_at)
             VALUES (?, ?, 'mod-1', 'beginner', 5, 5, ?, 0)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user)
        .bind(points)
        .execute(&pool)
        .await
        .unwrap();
    }

    let response = app
        .oneshot(get_request("/api/assessments/topUsers"))
        .await
        .unwrap();
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["total_points"], 25);
    assert_eq!(data[0]["email"], "l1@example.com");
}

// ========================================
// Observations
// ========================================

#[tokio::test]
async fn test_observation_create_submit_and_score() {
    let (app, pool) = create_test_app().await;
    let session = seed_case(&pool, "obs case", true, 1000).await;
    let (user_id, token, _) = register_and_login(&app, "o@example.com", "9000000018").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/observation/create",
            &json!({
                "session_id": session,
                "module_name": "Neuro",
                "items": [
                    { "observation_text": "Midline shift?", "correct_answer": "yes", "points": 10 },
                    { "observation_text": "Hemorrhage?", "correct_answer": "no", "points": 5 },
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/observation/get?video_id={}",
            session
        )))
        .await
        .unwrap();
    let json = body_json(response).await;
    let items = json["data"][0]["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 2);
    let first_item = items[0]["guid"].as_str().unwrap().to_string();
    let second_item = items[1]["guid"].as_str().unwrap().to_string();

    // One right (10 pts), one wrong
    let response = app
        .clone()
        .oneshot(post_json_authed(
            "/api/observation/submit",
            &json!({
                "session_id": session,
                "answers": [
                    { "item_id": first_item, "answer": "YES" },
                    { "item_id": second_item, "answer": "yes" },
                ],
            }),
            &token,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["total_correct"], 1);
    assert_eq!(json["score"], 10);

    let response = app
        .oneshot(get_authed(
            &format!("/api/observation/scores/{}/{}", user_id, session),
            &token,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["score"], 10);
    assert_eq!(json["total_attempts"], 2);
}

// ========================================
// Catalog
// ========================================

#[tokio::test]
async fn test_modules_with_pathology_counts() {
    let (app, pool) = create_test_app().await;
    sqlx::query(
        "INSERT INTO modules (guid, module_name, created_at) VALUES ('m1', 'Neuro', 0)",
    )
    .execute(&pool)
    .await
    .unwrap();
    for i in 0..4 {
        sqlx::query(
            "INSERT INTO pathologies (guid, pathology_name, module_id, created_at)
             VALUES (?, ?, 'm1', ?)",
        )
        .bind(format!("p{}", i))
        .bind(format!("Pathology {}", i))
        .bind(i)
        .execute(&pool)
        .await
        .unwrap();
    }

    let response = app
        .clone()
        .oneshot(get_request("/api/modules/getWithPathologyCount"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["data"][0]["pathology_count"], 4);
    // Capped at three samples
    assert_eq!(
        json["data"][0]["sample_pathologies"].as_array().unwrap().len(),
        3
    );

    // Comma-separated by-module query
    let response = app
        .oneshot(get_request("/api/pathologies/getByModule?module_id=m1,m2"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_duplicate_names_rejected_distinct_names_pass() {
    let (app, _pool) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/api/modules/create", &json!({ "module_name": "Neuro" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Only the unique-name collision maps to 400
    let response = app
        .clone()
        .oneshot(post_json("/api/modules/create", &json!({ "module_name": "Neuro" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "A module with this name already exists");

    let response = app
        .clone()
        .oneshot(post_json("/api/modules/create", &json!({ "module_name": "Chest" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let faculty = json!({ "name": "Dr. A", "email": "a@clinic.example" });
    let response = app
        .clone()
        .oneshot(post_json("/api/faculty/create", &faculty))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json("/api/faculty/create", &faculty))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "A faculty member with this email already exists");
}
