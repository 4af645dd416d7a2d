//! # Intermediate Representation (IR)
//!
//! The IR sits between a rendered bitmap and the raw bytes written to the
//! printer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────┐     ┌──────────┐
//! │   Bitmap    │ ──► │   Encode    │ ──► │    IR    │ ──► │ Codegen  │
//! │ (384 dots)  │     │ (slicing)   │     │(Vec<Op>) │     │ (bytes)  │
//! └─────────────┘     └─────────────┘     └──────────┘     └──────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use t02relay::ir::{Op, Program};
//! use t02relay::printer::PrinterConfig;
//! use t02relay::render::MonochromeBitmap;
//!
//! let bitmap = MonochromeBitmap::new(384, 300).unwrap();
//! let program = Program::from_bitmap(&bitmap, &PrinterConfig::T02).unwrap();
//!
//! assert_eq!(program.ops.first(), Some(&Op::Init));
//! assert_eq!(program.raster_count(), 3); // 128 + 128 + 44 rows
//! assert_eq!(program.ops.last(), Some(&Op::Feed { lines: 1 }));
//!
//! let frames = program.to_frames();
//! assert_eq!(frames.concat(), program.to_bytes());
//! ```

mod codegen;
mod encode;
mod ops;

pub use encode::encode;
pub use ops::*;
