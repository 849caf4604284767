//! SACP binary protocol client.
//!
//! Implements the framed protocol on TCP port 8888 used by devices that
//! advertise `SACP:1` in their discovery reply. Uploads are device-driven:
//! after the begin request the device asks for each chunk by index.

mod client;
mod error;
pub(crate) mod io;
pub(crate) mod protocol;
mod transfer;
pub(crate) mod types;


// Re-export public API
pub use client::SacpClient;
pub use error::FrameError;
pub use protocol::{MAX_DATA_SIZE, decode_frame, encode_frame};
pub use types::{CHUNK_SIZE, DEFAULT_PORT, Frame};
