//! Server-Sent Events (SSE) core for the planning relay.
//!
//! This crate owns the relay's only shared mutable state - the set of open
//! client connections - and the routing rules that fan inbound notifications
//! out to them.
//!
//! # Architecture
//!
//! - **Client-generated connection ids**: each browser tab connects with its
//!   own id, which doubles as the origin-exclusion token so a tab never gets
//!   its own change echoed back.
//! - **Dual-index registry**: connection storage plus a user index, so
//!   user-targeted pushes and user-scoped forced disconnects stay O(1).
//! - **Senders own the streams**: the registry holds each connection's only
//!   channel sender; removing an entry ends the client's stream, which is
//!   how forced disconnects close transports.
//! - **Ephemeral events**: no persistence or replay - a client that is
//!   offline misses the event and reloads fresh state on reconnect.
//!
//! # Message Flow
//!
//! 1. Browser establishes a stream via the web layer, which registers a
//!    connection here and holds a [`manager::ConnectionGuard`] for teardown.
//! 2. The CRUD backend POSTs a notification to the ingest endpoint.
//! 3. [`Manager::route`] strips the origin, then either fans the event out
//!    to the topic's subscribers, redirects an `admin/users` change to the
//!    affected user, or executes a forced disconnect.
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry with dual-index storage and ConnectionId
//! - `manager`: notification routing and the RAII deregistration guard
//! - `message`: the channel-level frame model and SSE event conversion

pub mod connection;
pub mod manager;
pub mod message;

pub use manager::Manager;
