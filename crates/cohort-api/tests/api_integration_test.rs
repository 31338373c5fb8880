//! Integration tests for the Cohort REST API
//!
//! Tests the HTTP endpoints by creating a real router over an in-memory
//! membership store, then sending requests via tower::ServiceExt.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{Datelike, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use cohort_api::models::{MembershipRequest, Segment, User};
use cohort_api::{create_router, AppState};
use cohort_membership::{MembershipStore, SqliteMembershipStore};

/// Create a test app over a fresh in-memory store
async fn test_app() -> (axum::Router, Arc<dyn MembershipStore>) {
    let store = Arc::new(SqliteMembershipStore::new_in_memory().await.unwrap())
        as Arc<dyn MembershipStore>;
    (create_router(AppState::new(store.clone())), store)
}

/// Helper to read response body as bytes
async fn body_bytes(body: Body) -> Vec<u8> {
    body.collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &axum::Router, req: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(req).await.unwrap()
}

// ---------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------

#[tokio::test]
async fn test_health_check() {
    let (app, _) = test_app().await;

    let resp = send(&app, get("/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_openapi_document() {
    let (app, _) = test_app().await;

    let resp = send(&app, get("/api-docs/openapi.json")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp.into_body()).await;
    assert!(json["paths"]["/users/{id}/history"].is_object());
    assert!(json["paths"]["/segments"].is_object());
}

// ---------------------------------------------------------------
// Segments
// ---------------------------------------------------------------

#[tokio::test]
async fn test_create_segment_echoes_body() {
    let (app, store) = test_app().await;

    let resp = send(
        &app,
        json_request(
            Method::POST,
            "/segments",
            serde_json::json!({"segment": "AVITO_VOICE_MESSAGES"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let json = body_json(resp.into_body()).await;
    assert_eq!(json, serde_json::json!({"segment": "AVITO_VOICE_MESSAGES"}));
    assert!(store
        .get_segment("AVITO_VOICE_MESSAGES")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_create_segment_rejects_bad_input() {
    let (app, store) = test_app().await;

    let resp = send(
        &app,
        json_request(
            Method::POST,
            "/segments",
            serde_json::json!({"segment": "x", "auto_percent": 150}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(store.get_segment("x").await.unwrap().is_none());

    let resp = send(
        &app,
        json_request(Method::POST, "/segments", serde_json::json!({"segment": ""})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/segments")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["text"], "can't unmarshal json");
}

#[tokio::test]
async fn test_duplicate_segment_is_bad_request() {
    let (app, _) = test_app().await;
    let body = serde_json::json!({"segment": "dup"});

    let resp = send(&app, json_request(Method::POST, "/segments", body.clone())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(&app, json_request(Method::POST, "/segments", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp.into_body()).await;
    assert!(json["text"].as_str().unwrap().contains("dup"));
}

#[tokio::test]
async fn test_delete_segment() {
    let (app, _) = test_app().await;

    let resp = send(
        &app,
        json_request(Method::DELETE, "/segments", serde_json::json!({"segment": "ghost"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    send(
        &app,
        json_request(Method::POST, "/segments", serde_json::json!({"segment": "real"})),
    )
    .await;
    let resp = send(
        &app,
        json_request(Method::DELETE, "/segments", serde_json::json!({"segment": "real"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, get("/segments")).await;
    let segments: Vec<Segment> =
        serde_json::from_slice(&body_bytes(resp.into_body()).await).unwrap();
    assert!(segments.is_empty());
}

#[tokio::test]
async fn test_auto_percent_enrolls_existing_users() {
    let (app, _) = test_app().await;

    for id in 1..=3 {
        let resp = send(
            &app,
            json_request(Method::POST, "/users", serde_json::json!({"id": id})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = send(
        &app,
        json_request(
            Method::POST,
            "/segments",
            serde_json::json!({"segment": "promo", "auto_percent": 100}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    for id in 1..=3 {
        let resp = send(&app, get(&format!("/users/{}", id))).await;
        let user: User = serde_json::from_slice(&body_bytes(resp.into_body()).await).unwrap();
        assert_eq!(user.segments, vec!["promo"]);
    }

    let resp = send(&app, get("/segments")).await;
    let segments: Vec<Segment> =
        serde_json::from_slice(&body_bytes(resp.into_body()).await).unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].auto_percent, 100);
}

// ---------------------------------------------------------------
// Users
// ---------------------------------------------------------------

#[tokio::test]
async fn test_user_lifecycle() {
    let (app, _) = test_app().await;

    for name in ["a", "b"] {
        send(
            &app,
            json_request(Method::POST, "/segments", serde_json::json!({"segment": name})),
        )
        .await;
    }

    let resp = send(&app, json_request(Method::POST, "/users", serde_json::json!({"id": 1}))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp.into_body()).await, serde_json::json!({"id": 1}));

    // Duplicate
    let resp = send(&app, json_request(Method::POST, "/users", serde_json::json!({"id": 1}))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Add, with duplicates collapsed in the echo
    let resp = send(
        &app,
        json_request(
            Method::PATCH,
            "/users",
            serde_json::json!({"id": 1, "segments": ["b", "a", "b"], "active_time": 3600}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let echoed: MembershipRequest =
        serde_json::from_slice(&body_bytes(resp.into_body()).await).unwrap();
    assert_eq!(echoed.segments, vec!["b", "a"]);
    assert_eq!(echoed.active_time, Some(3600));

    let resp = send(&app, get("/users/1")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp.into_body()).await,
        serde_json::json!({"id": 1, "segments": ["a", "b"]})
    );

    // Remove
    let resp = send(
        &app,
        json_request(
            Method::DELETE,
            "/users",
            serde_json::json!({"id": 1, "segments": ["a"]}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, get("/users/1")).await;
    assert_eq!(
        body_json(resp.into_body()).await,
        serde_json::json!({"id": 1, "segments": ["b"]})
    );
}

#[tokio::test]
async fn test_unknown_user_and_segment() {
    let (app, _) = test_app().await;

    let resp = send(&app, get("/users/999")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["text"], "user doesn't exist");

    let resp = send(
        &app,
        json_request(
            Method::PATCH,
            "/users",
            serde_json::json!({"id": 999, "segments": []}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    send(&app, json_request(Method::POST, "/users", serde_json::json!({"id": 5}))).await;
    let resp = send(
        &app,
        json_request(
            Method::PATCH,
            "/users",
            serde_json::json!({"id": 5, "segments": ["nope"]}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp.into_body()).await;
    assert!(json["text"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_invalid_user_ids() {
    let (app, _) = test_app().await;

    for uri in ["/users/abc", "/users/0", "/users/-1"] {
        let resp = send(&app, get(uri)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["text"], "invalid user id");
    }

    let resp = send(&app, json_request(Method::POST, "/users", serde_json::json!({"id": 0}))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------
// History export
// ---------------------------------------------------------------

#[tokio::test]
async fn test_history_csv() {
    let (app, _) = test_app().await;
    let now = Utc::now();

    send(
        &app,
        json_request(Method::POST, "/segments", serde_json::json!({"segment": "promo"})),
    )
    .await;
    send(&app, json_request(Method::POST, "/users", serde_json::json!({"id": 1}))).await;
    send(
        &app,
        json_request(
            Method::PATCH,
            "/users",
            serde_json::json!({"id": 1, "segments": ["promo"]}),
        ),
    )
    .await;
    send(
        &app,
        json_request(
            Method::DELETE,
            "/users",
            serde_json::json!({"id": 1, "segments": ["promo"]}),
        ),
    )
    .await;

    let uri = format!("/users/1/history?year={}&month={}", now.year(), now.month());
    let resp = send(&app, get(&uri)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=test.csv"
    );
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let body = String::from_utf8(body_bytes(resp.into_body()).await).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines[0], "id,segment,time_in,time_out");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("1,promo,"));
}

#[tokio::test]
async fn test_history_rejects_bad_params() {
    let (app, _) = test_app().await;

    let cases = [
        ("/users/x/history?year=2023&month=9", "invalid user id"),
        ("/users/1/history?year=abc&month=9", "invalid year"),
        ("/users/1/history?month=9", "invalid year"),
        ("/users/1/history?year=2023&month=13", "invalid month"),
        ("/users/1/history?year=2023&month=0", "invalid month"),
        ("/users/1/history?year=2023", "invalid month"),
    ];

    for (uri, text) in cases {
        let resp = send(&app, get(uri)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["text"], text, "{}", uri);
    }
}
