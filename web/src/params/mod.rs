//! This module holds typed parameters for various endpoint inputs.
//!
//! Each endpoint's query inputs are represented by a struct deserialized at
//! the boundary, so handlers work with validated, typed values instead of a
//! raw query map.

pub(crate) mod events;
