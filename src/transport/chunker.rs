//! # Transport Chunker
//!
//! Splits an encoded frame into pieces no longer than the link's negotiated
//! write size. The printer drains its receive buffer slowly, so the sender
//! waits [`Chunker::pacing`] after every chunk.
//!
//! ```text
//! frame (300 bytes), max 128
//!
//! [0..128] ─ 20ms ─ [128..256] ─ 20ms ─ [256..300] ─ 20ms
//! ```
//!
//! The chunker knows nothing about frame contents. Iteration is lazy and can
//! be restarted any number of times.

use std::time::Duration;

use crate::error::{RelayError, Result};

/// Default pause after each chunk.
pub const DEFAULT_PACING: Duration = Duration::from_millis(20);

/// Lazily splits a byte slice into bounded chunks.
///
/// ```
/// use std::time::Duration;
/// use t02relay::transport::Chunker;
///
/// let frame = vec![7u8; 300];
/// let chunker = Chunker::new(&frame, 128, Duration::from_millis(20)).unwrap();
///
/// let sizes: Vec<usize> = chunker.iter().map(|c| c.len()).collect();
/// assert_eq!(sizes, vec![128, 128, 44]);
/// assert_eq!(chunker.iter().count(), 3); // restartable
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Chunker<'a> {
    data: &'a [u8],
    max_chunk: usize,
    pacing: Duration,
}

impl<'a> Chunker<'a> {
    /// Fails with [`RelayError::InvalidCommand`] if `max_chunk` is zero.
    pub fn new(data: &'a [u8], max_chunk: usize, pacing: Duration) -> Result<Self> {
        if max_chunk == 0 {
            return Err(RelayError::InvalidCommand(
                "chunk size must be at least 1 byte".to_string(),
            ));
        }
        Ok(Self {
            data,
            max_chunk,
            pacing,
        })
    }

    /// A fresh pass over the chunks.
    pub fn iter(&self) -> std::slice::Chunks<'a, u8> {
        self.data.chunks(self.max_chunk)
    }

    /// Delay to observe after each chunk.
    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Number of chunks a pass yields.
    pub fn len(&self) -> usize {
        self.data.len().div_ceil(self.max_chunk)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<'a> IntoIterator for &Chunker<'a> {
    type Item = &'a [u8];
    type IntoIter = std::slice::Chunks<'a, u8>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
