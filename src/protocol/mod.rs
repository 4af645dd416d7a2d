//! # T02 Protocol Implementation
//!
//! Low-level command builders for the raster subset of ESC/POS spoken by
//! the Phomemo T02.
//!
//! ## Module Structure
//!
//! - [`commands`]: Reset and paper feed
//! - [`graphics`]: Raster bit image command
//!
//! ## Usage Example
//!
//! ```
//! use t02relay::protocol::{commands, graphics};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(graphics::raster(48, 2, &[0xFF; 96]));
//! data.extend(commands::feed(1));
//! assert_eq!(data.len(), 2 + 8 + 96 + 3);
//! ```

pub mod commands;
pub mod graphics;
