//! # Error Types
//!
//! This module defines the error type shared by every stage of the relay:
//! rendering, protocol encoding, the printer link, peer forwarding and the
//! cloud queue.
//!
//! ## Propagation
//!
//! | Variant | Raised by | Outcome |
//! |---------|-----------|---------|
//! | `Decode` | rasterizer, bridge, cloud | job discarded |
//! | `EmptyImage` / `EmptyContent` | rasterizer, text layout | job discarded |
//! | `NotConnected` | write queue | status message, no retry |
//! | `LinkTimeout` | link manager | recovered by rescanning |
//! | `PeerSend` | job router | status message, no retry |

use thiserror::Error;

/// Main error type for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    /// Source image or payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Rendering produced an image with a zero dimension
    #[error("Image is empty")]
    EmptyImage,

    /// Both text and title are empty after trimming
    #[error("Nothing to print: text and title are empty")]
    EmptyContent,

    /// Write attempted while the printer link is not ready
    #[error("Printer is not connected")]
    NotConnected,

    /// Connect attempt exceeded its bound
    #[error("Connection attempt timed out")]
    LinkTimeout,

    /// Forwarding a job to a peer failed
    #[error("Peer send failed: {0}")]
    PeerSend(String),

    /// Transport-level errors (device I/O, radio)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid command or parameter
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Cloud relay queue errors
    #[error("Cloud relay error: {0}")]
    Cloud(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// True for errors caused by the submitted content itself.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::EmptyImage | Self::EmptyContent | Self::InvalidCommand(_)
        )
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RelayError>;
