//! Shared server state

use crate::bridge::GoProBridge;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared application state
pub struct AppState {
    /// Device operations behind the channel
    pub bridge: GoProBridge,
    /// Number of connected event-stream clients
    event_clients: AtomicUsize,
}

impl AppState {
    /// Create a new application state
    pub fn new(bridge: GoProBridge) -> Self {
        Self {
            bridge,
            event_clients: AtomicUsize::new(0),
        }
    }

    pub fn event_clients(&self) -> usize {
        self.event_clients.load(Ordering::Relaxed)
    }

    /// Track an event client until the returned guard drops
    pub fn track_event_client(&self) -> EventClientGuard<'_> {
        self.event_clients.fetch_add(1, Ordering::Relaxed);
        EventClientGuard { state: self }
    }
}

/// Decrements the event client count on drop
pub struct EventClientGuard<'a> {
    state: &'a AppState,
}

impl Drop for EventClientGuard<'_> {
    fn drop(&mut self) {
        self.state.event_clients.fetch_sub(1, Ordering::Relaxed);
    }
}
