//! SACP protocol types and constants.

// Command pairs (command set, command id)
pub(crate) const CMD_HELLO: (u8, u8) = (0x01, 0x05);
pub(crate) const CMD_SESSION_END: (u8, u8) = (0x01, 0x06);
pub(crate) const CMD_UPLOAD_BEGIN: (u8, u8) = (0xB0, 0x00);
pub(crate) const CMD_UPLOAD_CHUNK: (u8, u8) = (0xB0, 0x01);
pub(crate) const CMD_UPLOAD_DONE: (u8, u8) = (0xB0, 0x02);

// Endpoint ids
pub(crate) const RECEIVER_CONTROLLER: u8 = 2;
pub(crate) const SENDER_HOST: u8 = 0;

// Frame attributes
pub(crate) const ATTR_REQUEST: u8 = 0;
pub(crate) const ATTR_RESPONSE: u8 = 1;

// Protocol constants
pub(crate) const MAGIC: [u8; 2] = [0xAA, 0x55];
pub(crate) const VERSION: u8 = 0x01;
pub(crate) const PREFIX_SIZE: usize = 4; // magic(2) + length(2)
pub(crate) const MIN_FRAME_SIZE: usize = 13;
pub(crate) const FRAME_OVERHEAD: usize = 15; // header(13) + trailing checksum(2)
pub(crate) const LENGTH_EXTRA: usize = 8; // sender..command_id(6) + checksum(2)

/// Bytes per requested chunk (60 KiB).
pub const CHUNK_SIZE: usize = 60 * 1024;

/// Default device-side SACP port.
pub const DEFAULT_PORT: u16 = 8888;

/// One SACP protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub receiver_id: u8,
    pub sender_id: u8,
    /// 0 = request, 1 = response to a specific request.
    pub attribute: u8,
    pub sequence: u16,
    pub command_set: u8,
    pub command_id: u8,
    pub data: Vec<u8>,
}

impl Frame {
    /// Host-to-controller request.
    pub(crate) fn request(command: (u8, u8), sequence: u16, data: Vec<u8>) -> Self {
        Self {
            receiver_id: RECEIVER_CONTROLLER,
            sender_id: SENDER_HOST,
            attribute: ATTR_REQUEST,
            sequence,
            command_set: command.0,
            command_id: command.1,
            data,
        }
    }

    /// Host-to-controller response echoing the request's sequence.
    pub(crate) fn response(command: (u8, u8), sequence: u16, data: Vec<u8>) -> Self {
        Self {
            attribute: ATTR_RESPONSE,
            ..Self::request(command, sequence, data)
        }
    }

    /// `(command_set, command_id)` pair.
    pub fn command(&self) -> (u8, u8) {
        (self.command_set, self.command_id)
    }
}
