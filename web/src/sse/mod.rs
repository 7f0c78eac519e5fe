//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the client stream
//! endpoint. The core SSE infrastructure (Manager, ConnectionRegistry,
//! Frame) lives in the `sse` crate.

pub mod handler;
