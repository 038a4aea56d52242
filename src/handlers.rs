use crate::error::Error;
use crate::service::{ActionRequest, ShiftService};
use crate::utils::time::Clock;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ShiftService>,
    pub clock: Arc<dyn Clock>,
    pub default_timezone: String,
}

/// Uniform response envelope. Every action reply, success or failure,
/// comes back HTTP 200 with `success` carrying the verdict.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    server_timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_timezone: Option<String>,
    server_time: String,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner).post(handle_action))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn banner() -> Json<Value> {
    Json(serde_json::json!({ "message": "Real-time shift tracking active" }))
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_action(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Json<ApiResponse> {
    let server_time = state.clock.now_utc().to_rfc3339();

    // A body that fails JSON extraction still gets the envelope, never a
    // bare 4xx.
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected request body");
            return Json(ApiResponse {
                success: false,
                message: Some(format!("Invalid request body: {}", rejection)),
                data: None,
                count: None,
                server_timezone: state.default_timezone.clone(),
                client_timezone: None,
                server_time,
            });
        }
    };

    let client_timezone = request.client_timezone.clone();

    let response = match state.service.dispatch(&request).await {
        Ok(outcome) => ApiResponse {
            success: true,
            message: outcome.message,
            data: outcome.data,
            count: outcome.count,
            server_timezone: state.default_timezone.clone(),
            client_timezone,
            server_time,
        },
        Err(error) => {
            // Validation and lookup misses are expected traffic and are
            // surfaced verbatim; anything else is logged with its prefix.
            let message = match &error {
                Error::Validation(m) | Error::NotFound(m) => m.clone(),
                other => {
                    warn!(action = %request.action, error = %other, "Action failed");
                    other.to_string()
                }
            };
            ApiResponse {
                success: false,
                message: Some(message),
                data: None,
                count: None,
                server_timezone: state.default_timezone.clone(),
                client_timezone,
                server_time,
            }
        }
    };

    Json(response)
}
