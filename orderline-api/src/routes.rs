//! HTTP routes: lookup form, order JSON, health and metrics.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::metrics_handler;

const LOOKUP_FORM: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Order lookup</title>
</head>
<body>
    <form onsubmit="openOrder(); return false;">
        <input type="text" id="order_uid" placeholder="Order ID" required>
        <button type="submit">Find</button>
    </form>
    <script>
        function openOrder() {
            var orderUid = document.getElementById('order_uid').value;
            window.location.href = '/order/' + encodeURIComponent(orderUid);
        }
    </script>
</body>
</html>"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub cached_orders: usize,
    pub uptime_secs: u64,
}

/// Build the service router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(lookup_form))
        .route("/order/:order_uid", get(get_order))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn lookup_form() -> Html<&'static str> {
    Html(LOOKUP_FORM)
}

/// GET /order/:order_uid - the order as indented JSON.
async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> ApiResult<Response> {
    let order = state
        .lookup
        .get_order(&order_uid)
        .await?
        .ok_or_else(ApiError::order_not_found)?;

    let body = serde_json::to_string_pretty(&*order)
        .map_err(|e| ApiError::internal_error(format!("Failed to encode order: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        cached_orders: state.cache.len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
