//! # t02relay - Print Relay for the Phomemo T02
//!
//! t02relay turns images and text into raster jobs for the Phomemo T02
//! thermal printer and delivers them over a short-range link. It provides:
//!
//! - **Rasterizer**: decode, scale to 384 dots, auto-rotate, dither to 1-bit
//! - **Text layout**: wrapped documents and sideways banners
//! - **Protocol**: `ESC @`, `GS v 0` raster slices and `ESC d` feed
//! - **Transport**: paced chunked writes over a link state machine
//! - **Job router**: host/client sharing over the LAN, plus a cloud queue
//!
//! ## Quick Start
//!
//! ```
//! use t02relay::{ir, printer::PrinterConfig};
//! use t02relay::text::{FontBook, TextOptions, layout_text};
//!
//! let printer = PrinterConfig::T02;
//! let layout = layout_text(&TextOptions::document("Hello world", 40.0), &FontBook::builtin(), &printer)?;
//! let program = ir::encode(&layout.bitmap, None, &printer)?;
//!
//! let frames = program.to_frames();
//! assert_eq!(frames.first().map(Vec::as_slice), Some(&[0x1B, 0x40][..]));
//! # Ok::<(), t02relay::RelayError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`render`] | Rasterizer and dithering |
//! | [`text`] | Text layout engine |
//! | [`protocol`] | T02 command builders |
//! | [`ir`] | Job programs and frame lists |
//! | [`transport`] | Chunker, link state machine, RFCOMM radio |
//! | [`router`] | Job routing, LAN peers, cloud relay |
//! | [`relay`] | Process-wide context |
//! | [`server`] | HTTP API |
//! | [`config`] | Runtime configuration |
//! | [`logging`] | Subscriber setup and recent log lines |
//! | [`printer`] | Printer geometry |
//! | [`error`] | Error types |

pub mod config;
pub mod error;
pub mod ir;
pub mod logging;
pub mod printer;
pub mod protocol;
pub mod relay;
pub mod render;
pub mod router;
pub mod server;
pub mod text;
pub mod transport;

// Re-exports for convenience
pub use error::RelayError;
pub use printer::PrinterConfig;
pub use relay::Relay;
