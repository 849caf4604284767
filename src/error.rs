//! Error types and handling.

use thiserror::Error;

use crate::sacp::FrameError;

/// Broad failure category, used to tell "device unreachable" apart from
/// "device rejected" and "malformed protocol response".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket or HTTP I/O failure.
    Transport,
    /// Frame decode, checksum, version or request layout problem.
    Protocol,
    /// The device refused or broke the session.
    Session,
    /// Rejected locally before talking to the device.
    Validation,
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SACP frame could not be decoded
    #[error("SACP frame error: {0}")]
    Frame(#[from] FrameError),

    /// SACP hello exchange did not complete
    #[error("SACP handshake failed: {0}")]
    HandshakeFailed(String),

    /// Device stopped answering during an upload
    #[error("Upload timeout: {0}")]
    UploadTimeout(String),

    /// Socket failure during a SACP upload
    #[error("SACP upload I/O error: {0}")]
    UploadIo(String),

    /// Device asked for a chunk with a truncated or out-of-range request
    #[error("Malformed chunk request: {0}")]
    MalformedChunkRequest(String),

    /// HTTP session could not be established
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// User declined the session on the device, or the session was revoked
    #[error("Access denied by device")]
    AccessDenied,

    /// HTTP endpoint answered with a status the session cannot handle
    #[error("{operation} returned unexpected status {status}")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    /// Upload was cancelled by the caller
    #[error("Upload cancelled")]
    Cancelled,

    /// Discovery reply did not match the announcement format
    #[error("Invalid discovery reply: {0}")]
    InvalidReply(String),

    /// Payload has no content
    #[error("Payload is empty")]
    PayloadEmpty,

    /// Payload exceeds the 2 GiB ceiling
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(u64),

    /// No handler could reach the device
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Create a config error with message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error with message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::Io(_) | Self::UploadTimeout(_) | Self::UploadIo(_) | Self::ConnectFailed(_) => {
                ErrorKind::Transport
            }
            Self::Frame(_) | Self::MalformedChunkRequest(_) | Self::InvalidReply(_) => ErrorKind::Protocol,
            Self::HandshakeFailed(_) | Self::AccessDenied | Self::UnexpectedStatus { .. } | Self::Cancelled => {
                ErrorKind::Session
            }
            Self::PayloadEmpty
            | Self::PayloadTooLarge(_)
            | Self::DeviceUnavailable(_)
            | Self::Config(_)
            | Self::Validation(_) => ErrorKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AppError::PayloadEmpty.kind(), ErrorKind::Validation);
        assert_eq!(AppError::AccessDenied.kind(), ErrorKind::Session);
        assert_eq!(AppError::UploadTimeout("read".into()).kind(), ErrorKind::Transport);
        assert_eq!(AppError::Frame(FrameError::InvalidMagic).kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_unexpected_status_message() {
        let err = AppError::UnexpectedStatus {
            operation: "upload",
            status: 500,
        };
        assert_eq!(err.to_string(), "upload returned unexpected status 500");
    }
}
