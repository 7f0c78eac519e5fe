use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use service::AppState;

/// GET liveness probe, reporting the number of open stream connections.
pub(crate) async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": app_state.sse_manager.connection_count(),
    }))
}
