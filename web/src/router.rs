use crate::controller::{health_check_controller, notify_controller};
use crate::sse::handler;
use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use service::AppState;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Router for the public client surface: the long-lived event stream plus a
/// liveness probe.
pub fn client_router(app_state: AppState) -> Router {
    Router::new()
        .route("/events", get(handler::sse_handler))
        .layer(cors_layer())
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

/// Router for the internal ingest surface. Trusted-caller only: it carries
/// no authentication and is bound to an internal interface by configuration.
pub fn notify_router(app_state: AppState) -> Router {
    Router::new()
        .route("/notify", post(notify_controller::create))
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

// The admin UI is served from another origin and authenticates with its
// session cookie, so the stream endpoint echoes the caller's origin and
// allows credentials rather than using a wildcard.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use service::config::Config;
    use service::store::mock::MemorySessionStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_stream_endpoint_echoes_the_request_origin() {
        let store = MemorySessionStore::new();
        store.insert_session("abc123", "u42");
        let app_state = AppState::new(
            Config::parse_from(["planning-relay"]),
            Arc::new(store),
            Arc::new(sse::Manager::new()),
        );

        let request = Request::builder()
            .uri("/events?id=tab-1&subs=bois/rdvs")
            .header("cookie", "sid=abc123")
            .header("origin", "https://planning.example")
            .body(Body::empty())
            .unwrap();
        let response = client_router(app_state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://planning.example"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .unwrap(),
            "true"
        );
    }
}
