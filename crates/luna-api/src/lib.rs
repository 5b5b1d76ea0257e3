//! HTTP and WebSocket surface for Luna.
//!
//! Thin I/O glue over the conversation core: JSON endpoints for text chat
//! and one-shot voice exchanges, plus a WebSocket endpoint that bridges a
//! live call connection onto a streaming session task.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::{ApiError, ErrorBody};
pub use routes::create_router;
pub use state::AppState;
