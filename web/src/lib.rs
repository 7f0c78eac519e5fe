//! HTTP surfaces of the planning relay.
//!
//! Two separate routers, served on separate listeners:
//!
//! - the **client surface** holds the long-lived `/events` stream that
//!   browsers subscribe to, authenticated against the external session
//!   store;
//! - the **ingest surface** accepts `/notify` messages from the trusted
//!   CRUD backend and hands them to the SSE manager for routing. It carries
//!   no authentication of its own and must stay on an internal interface.

use log::*;
use tokio::net::TcpListener;

mod controller;
mod extractors;
mod params;
mod router;
mod sse;

pub use router::{client_router, notify_router};
pub use service::AppState;

/// Bind both listeners and serve the two routers until either one fails.
pub async fn init(app_state: AppState) -> std::io::Result<()> {
    let config = app_state.config.clone();

    let client_listener =
        TcpListener::bind(format!("{}:{}", config.interface, config.port)).await?;
    let notify_listener = TcpListener::bind(format!(
        "{}:{}",
        config.notify_interface, config.notify_port
    ))
    .await?;

    info!(
        "Client stream endpoint listening on {}:{}",
        config.interface, config.port
    );
    info!(
        "Notification ingest endpoint listening on {}:{}",
        config.notify_interface, config.notify_port
    );

    let client_server = axum::serve(client_listener, client_router(app_state.clone()));
    let notify_server = axum::serve(notify_listener, notify_router(app_state));

    tokio::try_join!(async { client_server.await }, async { notify_server.await })?;

    Ok(())
}
