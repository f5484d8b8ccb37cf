//! HTTP request handlers
//!
//! Method calls over plain HTTP plus a small info endpoint.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use gopro_usb_core::{Method, MethodResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Method channel
        .route("/api/methods/:method", post(method_handler))
        .route("/ws/methods", get(crate::websocket::methods_ws_handler))
        // Event channel
        .route("/ws/events", get(crate::websocket::events_ws_handler))
        // Bridge info
        .route("/api/info", get(info_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Invoke a bridge method by name
pub async fn method_handler(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
) -> Json<MethodResponse> {
    debug!("HTTP method call: {}", method);
    Json(state.bridge.call(&method).await)
}

/// Bridge information response
#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub name: String,
    pub version: String,
    pub hostname: String,
    pub service_type: String,
    pub vendor_id: u16,
    pub methods: Vec<String>,
    pub bound_interface: Option<String>,
    pub event_clients: usize,
}

/// Describe the bridge
pub async fn info_handler(State(state): State<Arc<AppState>>) -> Json<BridgeInfo> {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let config = state.bridge.config();

    Json(BridgeInfo {
        name: "gopro-usb".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        hostname,
        service_type: config.service_type.clone(),
        vendor_id: config.vendor_id,
        methods: Method::ALL.iter().map(|m| m.as_str().to_string()).collect(),
        bound_interface: state.bridge.bound_interface(),
        event_clients: state.event_clients(),
    })
}
