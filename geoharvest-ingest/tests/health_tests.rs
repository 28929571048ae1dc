//! HTTP server tests for the health endpoint

use axum::body::Body;
use axum::http::{Request, StatusCode};
use geoharvest_ingest::api::health::HealthResponse;
use geoharvest_ingest::{build_router, AppState};
use http_body_util::BodyExt;
use std::sync::atomic::Ordering;
use tower::ServiceExt;

async fn get_health(state: AppState) -> (StatusCode, HealthResponse) {
    let app = build_router(state);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_ok_on_fresh_state() {
    let (status, health) = get_health(AppState::new()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "ok");
    assert_eq!(health.module, "geoharvest-ingest");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.steps_completed, 0);
    assert!(health.last_error.is_none());
}

#[tokio::test]
async fn test_health_reports_counters() {
    let state = AppState::new();
    state.counters.steps_completed.fetch_add(3, Ordering::Relaxed);
    state.counters.photos_accepted.fetch_add(41, Ordering::Relaxed);
    state.counters.features_saved.fetch_add(17, Ordering::Relaxed);

    let (_, health) = get_health(state).await;

    assert_eq!(health.steps_completed, 3);
    assert_eq!(health.photos_accepted, 41);
    assert_eq!(health.features_saved, 17);
}

#[tokio::test]
async fn test_health_degraded_after_failure() {
    let state = AppState::new();
    state
        .record_error("crawl step: asset fetch aborted: 3 of 8 failed")
        .await;

    let (status, health) = get_health(state).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "degraded");
    assert_eq!(
        health.last_error.as_deref(),
        Some("crawl step: asset fetch aborted: 3 of 8 failed")
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = build_router(AppState::new());
    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
