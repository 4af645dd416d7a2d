//! # HTTP API
//!
//! The UI shell talks to the relay over a small JSON API.
//!
//! ## Usage
//!
//! ```bash
//! t02relay serve --listen 0.0.0.0:8080 --mac AA:BB:CC:DD:EE:FF
//! ```
//!
//! ## Routes
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | GET | `/api/status` | |
//! | POST | `/api/print/image` | multipart `image`, `algorithm`, `threshold` |
//! | POST | `/api/print/text` | JSON text options |
//! | POST | `/api/bridge` | JSON `{base64, type}` |
//! | POST | `/api/preview/image` | as `/api/print/image` |
//! | POST | `/api/preview/text` | as `/api/print/text` |
//! | GET | `/api/preview/last` | |
//! | POST | `/api/rescan` | |
//! | PUT | `/api/display-name` | JSON `{name}` |

pub mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{RelayError, Result};
use crate::relay::Relay;

/// Upload limit for image endpoints.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Build the router. Tests drive it directly with `oneshot`.
pub fn app(relay: Arc<Relay>) -> Router {
    let state = Arc::new(AppState::new(relay));
    let upload_limit = DefaultBodyLimit::max(MAX_UPLOAD_BYTES);

    Router::new()
        .route("/api/status", get(handlers::control::status))
        .route(
            "/api/print/image",
            post(handlers::print::image).layer(upload_limit.clone()),
        )
        .route("/api/print/text", post(handlers::print::text))
        .route(
            "/api/bridge",
            post(handlers::print::bridge).layer(upload_limit.clone()),
        )
        .route(
            "/api/preview/image",
            post(handlers::preview::image).layer(upload_limit),
        )
        .route("/api/preview/text", post(handlers::preview::text))
        .route("/api/preview/last", get(handlers::preview::last))
        .route("/api/rescan", post(handlers::control::rescan))
        .route("/api/display-name", put(handlers::control::display_name))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the process exits.
pub async fn serve(relay: Arc<Relay>, listen_addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| RelayError::Transport(format!("Failed to bind to {}: {}", listen_addr, e)))?;
    info!(addr = %listen_addr, "HTTP API listening");

    axum::serve(listener, app(relay))
        .await
        .map_err(|e| RelayError::Transport(format!("Server error: {}", e)))
}
