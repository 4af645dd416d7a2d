//! # Printer Control Commands
//!
//! The T02 speaks a small ESC/POS subset. Only three commands are needed to
//! print a bitmap: reset, raster image and paper feed.
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix used by graphics commands
pub const GS: u8 = 0x1D;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Resets the printer to its power-on state. Sent once at the start of
/// every job.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
///
/// ## Example
///
/// ```
/// use t02relay::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

// ============================================================================
// PAPER FEED
// ============================================================================

/// # Print and Feed n Lines (ESC d n)
///
/// Advances the paper so consecutive jobs can be torn apart.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC d n |
/// | Hex     | 1B 64 n |
///
/// ## Example
///
/// ```
/// use t02relay::protocol::commands;
///
/// assert_eq!(commands::feed(5), vec![0x1B, 0x64, 5]);
/// ```
#[inline]
pub fn feed(lines: u8) -> Vec<u8> {
    vec![ESC, b'd', lines]
}

// ============================================================================
// HELPERS
// ============================================================================

/// Encode a u16 as little-endian bytes `[low, high]`.
///
/// ```
/// use t02relay::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(384), [0x80, 0x01]); // 384 = 0x0180
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [(value % 256) as u8, (value / 256) as u8]
}

/// Decode a little-endian `[low, high]` pair back into a u16.
#[inline]
pub const fn u16_from_le(bytes: [u8; 2]) -> u16 {
    bytes[0] as u16 + bytes[1] as u16 * 256
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert_eq!(init(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_feed() {
        assert_eq!(feed(1), vec![0x1B, 0x64, 0x01]);
        assert_eq!(feed(0), vec![0x1B, 0x64, 0x00]);
        assert_eq!(feed(255).len(), 3);
    }

    #[test]
    fn test_u16_le() {
        assert_eq!(u16_le(0x0000), [0x00, 0x00]);
        assert_eq!(u16_le(0x00FF), [0xFF, 0x00]);
        assert_eq!(u16_le(0xFF00), [0x00, 0xFF]);
        assert_eq!(u16_le(48), [48, 0]);
        assert_eq!(u16_le(300), [44, 1]);
    }

    #[test]
    fn test_u16_pair_recovers_every_value() {
        for value in 0..=u16::MAX {
            assert_eq!(u16_from_le(u16_le(value)), value);
        }
    }
}
