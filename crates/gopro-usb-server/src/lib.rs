//! gopro-usb Server - Axum-based HTTP and WebSocket message channel
//!
//! This crate exposes the camera bridge to the application layer: one-shot
//! method calls over HTTP or WebSocket, and a push stream of attach/detach events.

pub mod bridge;
pub mod http;
pub mod state;
pub mod websocket;

pub use bridge::GoProBridge;
pub use http::create_router;
pub use state::AppState;
pub use websocket::{handle_event_socket, handle_method_socket};
