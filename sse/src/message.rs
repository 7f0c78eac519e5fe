use axum::response::sse::Event;
use events::Notification;
use std::time::Duration;

/// Event name of the handshake frame sent once at connect time.
pub const EVENT_OPEN: &str = "open";

/// Event name of a routed notification frame.
pub const EVENT_DB: &str = "db";

/// Reconnect interval suggested to the client in the handshake frame.
pub const RETRY_MS: u64 = 5000;

/// A server-to-client SSE frame, held in each connection's channel.
///
/// Frames convert into `axum::response::sse::Event` at the stream boundary.
/// Keeping our own representation in the channel lets routing code and tests
/// inspect what was delivered; axum's `Event` exposes no accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: String,
    pub data: Option<String>,
    pub retry_ms: Option<u64>,
}

impl Frame {
    /// The handshake frame: `event: open` plus the suggested retry interval.
    pub fn open() -> Self {
        Self {
            event: EVENT_OPEN.to_string(),
            data: None,
            retry_ms: Some(RETRY_MS),
        }
    }

    /// A `db` frame carrying the JSON-serialized notification. The
    /// notification's `origin` is skip-serialized and so never appears here.
    pub fn db(notification: &Notification) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: EVENT_DB.to_string(),
            data: Some(serde_json::to_string(notification)?),
            retry_ms: None,
        })
    }
}

impl From<Frame> for Event {
    fn from(frame: Frame) -> Event {
        let mut event = Event::default().event(frame.event);
        if let Some(data) = frame.data {
            event = event.data(data);
        }
        if let Some(retry_ms) = frame.retry_ms {
            event = event.retry(Duration::from_millis(retry_ms));
        }
        event
    }
}
