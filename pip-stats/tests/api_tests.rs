//! Integration tests for the pip-stats HTTP API

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::*;
use pip_common::config::TomlConfig;
use pip_common::models::RAW_AUTHOR_COLLECTION;
use pip_stats::cache::CacheStore;
use pip_stats::{build_router, AppState, Components};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

async fn setup() -> (Components, axum::Router) {
    let components = test_components(&TomlConfig::default()).await;
    let app = build_router(AppState::new(components.orchestrator.clone()));
    (components, app)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_, app) = setup().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "pip-stats");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_unknown_author_is_degraded_not_an_error() {
    let (_, app) = setup().await;

    let response = app.oneshot(get("/api/author/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "source_unavailable");
    assert_eq!(body["refresh"], "scheduled");
    assert_eq!(body["aggregate"]["author_id"], "nobody");
    assert_eq!(body["aggregate"]["publications"], json!([]));
    assert_eq!(body["aggregate"]["pip_auc"], 0.0);
}

#[tokio::test]
async fn test_blank_author_id_rejected() {
    let (_, app) = setup().await;

    let response = app.oneshot(get("/api/author/%20")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_author_stats_recomputed_from_raw_record() {
    let (components, app) = setup().await;
    let author = raw_author("ada", "Ada", vec![stub("ada", 1, 3, 10), stub("ada", 2, 1, 0)], &[]);
    components
        .store
        .set(RAW_AUTHOR_COLLECTION, "ada", serde_json::to_value(&author).unwrap())
        .await;

    let response = app.clone().oneshot(get("/api/author/ada")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "recomputed");
    assert_eq!(body["aggregate"]["total_publications"], 2);
    assert_eq!(body["aggregate"]["publications"][0]["rank"], 1);
    assert!(body.get("refresh").is_none());

    let response = app.oneshot(get("/api/author/ada")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "cache_hit");
}

#[tokio::test]
async fn test_refresh_endpoint_accepts_and_reports() {
    let (_, app) = setup().await;

    let request = post_json(
        "/api/refresh",
        json!({"author_ids": ["a", "b"], "include_new_coauthors": false}),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total_authors"], 2);
    assert_eq!(body["not_scheduled"], 0);
    assert_eq!(body["authors"][0]["outcome"], "scheduled");

    let response = app
        .oneshot(post_json("/api/refresh", json!({"author_ids": ["a"]})))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["authors"][0]["outcome"], "already_queued");
}

#[tokio::test]
async fn test_malformed_refresh_body_is_json_error() {
    let (_, app) = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/refresh")
        .header("content-type", "application/json")
        .body(Body::from("{\"author_ids\": ["))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_publication_stats_endpoint() {
    let (components, app) = setup().await;
    let author = raw_author("ada", "Ada", vec![stub("ada", 1, 3, 10), stub("ada", 2, 1, 0)], &[]);
    components
        .store
        .set(RAW_AUTHOR_COLLECTION, "ada", serde_json::to_value(&author).unwrap())
        .await;

    let response = app
        .clone()
        .oneshot(get("/api/author/ada/publications/ada:p1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "recomputed");
    assert_eq!(body["stats"]["publication_id"], "ada:p1");
    assert_eq!(body["stats"]["author_publications"], 2);

    let response = app
        .oneshot(get("/api/author/ada/publications/ada:p8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_temporal_stats_endpoint() {
    let (components, app) = setup().await;
    let author = raw_author("ada", "Ada", vec![stub("ada", 1, 3, 10), stub("ada", 2, 1, 0)], &[]);
    components
        .store
        .set(RAW_AUTHOR_COLLECTION, "ada", serde_json::to_value(&author).unwrap())
        .await;

    let year = pip_common::time::current_year();
    let uri = format!("/api/author/ada/temporal?start_year={}", year - 1);
    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["author_id"], "ada");
    assert_eq!(body["years"].as_array().unwrap().len(), 1);
    assert_eq!(body["best_year"], year - 1);

    let response = app
        .clone()
        .oneshot(get("/api/author/ada/temporal?start_year=2020&end_year=2010"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/api/author/nobody/temporal")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
