//! Server state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::relay::Relay;

/// Application state shared across handlers.
pub struct AppState {
    pub relay: Arc<Relay>,
    /// Server start, reported by the status endpoint.
    pub started_at: DateTime<Local>,
}

impl AppState {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            started_at: Local::now(),
        }
    }
}
