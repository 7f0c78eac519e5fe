use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::params::events::StreamParams;
use async_stream::stream;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use log::*;
use service::AppState;
use sse::connection::ConnectionInfo;
use sse::message::Frame;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;

/// SSE handler that establishes a long-lived connection for real-time
/// updates. Authentication happens in the extractor: an unauthenticated
/// request is answered 401 before any connection is registered.
pub(crate) async fn sse_handler(
    AuthenticatedUser(user): AuthenticatedUser,
    Query(params): Query<StreamParams>,
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let connection_id = params.connection_id();
    debug!(
        "Establishing SSE connection {} for user {}",
        connection_id, user.user_id
    );

    let (tx, mut rx) = mpsc::unbounded_channel();

    let guard = app_state.sse_manager.register_connection(
        connection_id,
        ConnectionInfo {
            user_id: user.user_id,
            session_id: user.session_id,
            subscriptions: params.subscriptions(),
            sender: tx,
        },
    );

    // The stream owns the guard: whether the client goes away (generator
    // dropped mid-recv), the registry drops our sender (forced disconnect or
    // id replacement, recv returns None), or a write fails (response
    // dropped), the guard deregisters the connection exactly once.
    let stream = stream! {
        let _guard = guard;

        yield Ok(Frame::open().into());

        while let Some(frame) = rx.recv().await {
            yield Ok(frame.into());
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(app_state.config.sse_keep_alive_secs))
            .text("ping"),
    )
}
