//! # Code Generation
//!
//! Converts IR programs to T02 protocol bytes.

use super::ops::{Op, Program};
use crate::protocol::{commands, graphics};

impl Op {
    /// Encode this op as printer bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Op::Init => commands::init(),
            Op::Raster {
                width_bytes,
                height,
                data,
            } => graphics::raster(*width_bytes, *height, data),
            Op::Feed { lines } => commands::feed(*lines),
        }
    }
}

impl Program {
    /// Compile the whole program into one byte stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for op in &self.ops {
            out.extend(op.to_bytes());
        }
        out
    }

    /// One byte vector per op, in order.
    ///
    /// This is the frame list forwarded to peers.
    pub fn to_frames(&self) -> Vec<Vec<u8>> {
        self.ops.iter().map(Op::to_bytes).collect()
    }
}
