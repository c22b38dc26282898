//! Axum route handlers: the client stream, the EA bridge surface and the
//! read-only monitor endpoints.

pub mod bridge;
pub mod status;
pub mod stream;
