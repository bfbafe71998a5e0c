use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use railtalk::models::credentials::Credentials;
use railtalk::models::tool::ToolCall;
use serde_json::{json, Value};

use crate::state::AppState;

// Checks the settings by listing projects, the cheapest authenticated call
async fn handler(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Json(credentials) = body.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "rejected verify request");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": rejection.body_text()})),
        )
    })?;
    let call = ToolCall::new("get_projects", json!({}));
    match state.executor.invoke(&call, Some(&credentials)).await {
        Ok(_) => Ok(Json(json!({"message": "Connection successful."}))),
        Err(e) => {
            tracing::warn!(error = %e, "TestRail verification failed");
            Err((StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))))
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/verify", post(handler))
        .with_state(state)
}
