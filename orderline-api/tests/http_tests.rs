//! HTTP route tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use orderline_api::{create_router, AppState};
use orderline_core::Order;
use orderline_test_utils::{order_payload, sample_order};
use tower::ServiceExt;

#[path = "support/mock.rs"]
mod mock_support;
use mock_support::Harness;

fn app(harness: &Harness) -> Router {
    create_router(AppState::new(harness.query.clone(), Arc::clone(&harness.cache)))
}

async fn get(app: Router, uri: &str) -> Result<(StatusCode, Option<String>, String), String> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .map_err(|e| e.to_string())?;

    let response = app
        .oneshot(request)
        .await
        .map_err(|e| format!("Request failed: {:?}", e))?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| format!("Failed to read body: {:?}", e))?;
    let body = String::from_utf8(body.to_vec()).map_err(|e| format!("Invalid UTF-8 body: {}", e))?;

    Ok((status, content_type, body))
}

#[tokio::test]
async fn test_order_is_served_as_pretty_json() -> Result<(), String> {
    let harness = Harness::new();
    let order = sample_order("b563feb7b2b84b6test");
    harness
        .ingestor
        .ingest(&order_payload(&order))
        .await
        .map_err(|e| e.to_string())?;

    let (status, content_type, body) = get(app(&harness), "/order/b563feb7b2b84b6test").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert!(body.contains("\n  \"order_uid\": \"b563feb7b2b84b6test\""));
    let decoded: Order = serde_json::from_str(&body).map_err(|e| e.to_string())?;
    assert_eq!(decoded, order);
    Ok(())
}

#[tokio::test]
async fn test_unknown_order_is_404() -> Result<(), String> {
    let harness = Harness::new();

    let (status, _, body) = get(app(&harness), "/order/missing").await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("order not found"));
    Ok(())
}

#[tokio::test]
async fn test_store_failure_is_500_without_details() -> Result<(), String> {
    let harness = Harness::new();
    harness.store.fail_next_read("relation \"orders\" does not exist").await;

    let (status, _, body) = get(app(&harness), "/order/o-1").await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("relation"));
    Ok(())
}

#[tokio::test]
async fn test_lookup_form() -> Result<(), String> {
    let harness = Harness::new();

    let (status, content_type, body) = get(app(&harness), "/").await?;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap_or_default().starts_with("text/html"));
    assert!(body.contains("'/order/' + encodeURIComponent"));
    Ok(())
}

#[tokio::test]
async fn test_health_reports_cache_size() -> Result<(), String> {
    let harness = Harness::new();
    harness.cache.put(sample_order("o-1"));

    let (status, _, body) = get(app(&harness), "/health").await?;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).map_err(|e| e.to_string())?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["cached_orders"], 1);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() -> Result<(), String> {
    let harness = Harness::new();
    harness
        .ingestor
        .ingest(&order_payload(&sample_order("o-1")))
        .await
        .map_err(|e| e.to_string())?;

    let (status, _, body) = get(app(&harness), "/metrics").await?;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("orderline_ingest_total"));
    Ok(())
}
