use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use events::Notification;
use log::*;
use service::AppState;

/// POST one notification from the trusted backend.
///
/// Fire-and-forget from the caller's point of view: the body is decoded
/// once, routing enqueues frames on connection channels without awaiting
/// deliveries, and the response is 200 even for malformed bodies, which are
/// only logged.
pub(crate) async fn create(State(app_state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match serde_json::from_slice::<Notification>(&body) {
        Ok(notification) => {
            debug!(
                "Ingesting notification {} {} for subject {}",
                notification.name, notification.kind, notification.id
            );
            app_state.sse_manager.route(notification);
        }
        Err(e) => {
            warn!("Discarding malformed notification: {e}");
        }
    }

    StatusCode::OK
}
