//! SACP frame decoding errors.

use thiserror::Error;

/// Reasons a byte buffer is not a valid SACP frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Shorter than the fixed header.
    #[error("frame too short: {0} bytes")]
    MalformedFrame(usize),

    /// First two bytes are not 0xAA 0x55.
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Length field disagrees with the buffer size.
    #[error("length field {declared} does not match frame size {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Protocol version byte is not 0x01.
    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    /// CRC-8 over the header prefix does not match.
    #[error("header checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    HeaderChecksumMismatch { expected: u8, actual: u8 },

    /// Trailing 16-bit checksum does not match.
    #[error("trailing checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    TrailingChecksumMismatch { expected: u16, actual: u16 },

    /// Data does not fit the 16-bit length field.
    #[error("frame data too large: {0} bytes")]
    DataTooLarge(usize),
}

impl FrameError {
    /// True for either checksum mismatch.
    pub fn is_checksum(&self) -> bool {
        matches!(
            self,
            Self::HeaderChecksumMismatch { .. } | Self::TrailingChecksumMismatch { .. }
        )
    }
}
