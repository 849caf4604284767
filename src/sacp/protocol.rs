//! SACP frame encoding/decoding and checksum calculation.

use super::error::FrameError;
use super::types::{FRAME_OVERHEAD, Frame, LENGTH_EXTRA, MAGIC, MIN_FRAME_SIZE, VERSION};

/// Largest `data` that still fits the 16-bit length field.
pub const MAX_DATA_SIZE: usize = u16::MAX as usize - LENGTH_EXTRA;

/// CRC-8 over the frame prefix (poly 0x07, MSB first, init 0, no reflection).
pub(crate) fn header_checksum(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
    }
    crc
}

/// 16-bit ones complement checksum over big-endian words.
///
/// An odd trailing byte is added as its own value.
pub(crate) fn trailing_checksum(data: &[u8]) -> u16 {
    let mut sum: u64 = 0;
    for chunk in data.chunks(2) {
        if chunk.len() == 2 {
            sum += u64::from(u16::from_be_bytes([chunk[0], chunk[1]]));
        } else {
            sum += u64::from(chunk[0]);
        }
    }
    // Fold to 16 bits
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Encode a frame for the wire.
///
/// Layout: magic(2) + length(2) + version + receiver + header crc +
/// sender + attribute + sequence(2) + command set + command id + data +
/// trailing checksum(2).
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    if frame.data.len() > MAX_DATA_SIZE {
        return Err(FrameError::DataTooLarge(frame.data.len()));
    }

    let mut packet = Vec::with_capacity(FRAME_OVERHEAD + frame.data.len());

    packet.extend_from_slice(&MAGIC);
    packet.extend_from_slice(&((frame.data.len() + LENGTH_EXTRA) as u16).to_le_bytes());
    packet.push(VERSION);
    packet.push(frame.receiver_id);
    packet.push(header_checksum(&packet[..6]));

    packet.push(frame.sender_id);
    packet.push(frame.attribute);
    packet.extend_from_slice(&frame.sequence.to_le_bytes());
    packet.push(frame.command_set);
    packet.push(frame.command_id);
    packet.extend_from_slice(&frame.data);

    let checksum = trailing_checksum(&packet[7..]);
    packet.extend_from_slice(&checksum.to_le_bytes());

    Ok(packet)
}

/// Decode one complete frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < MIN_FRAME_SIZE {
        return Err(FrameError::MalformedFrame(bytes.len()));
    }
    if bytes[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let declared = usize::from(u16::from_le_bytes([bytes[2], bytes[3]]));
    if declared != bytes.len() - 7 {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    // A consistent length below 8 leaves no room for the trailing checksum
    if bytes.len() < FRAME_OVERHEAD {
        return Err(FrameError::MalformedFrame(bytes.len()));
    }

    if bytes[4] != VERSION {
        return Err(FrameError::UnsupportedVersion(bytes[4]));
    }

    let expected = header_checksum(&bytes[..6]);
    if bytes[6] != expected {
        return Err(FrameError::HeaderChecksumMismatch {
            expected,
            actual: bytes[6],
        });
    }

    let end = bytes.len() - 2;
    let expected = trailing_checksum(&bytes[7..end]);
    let actual = u16::from_le_bytes([bytes[end], bytes[end + 1]]);
    if actual != expected {
        return Err(FrameError::TrailingChecksumMismatch { expected, actual });
    }

    Ok(Frame {
        receiver_id: bytes[5],
        sender_id: bytes[7],
        attribute: bytes[8],
        sequence: u16::from_le_bytes([bytes[9], bytes[10]]),
        command_set: bytes[11],
        command_id: bytes[12],
        data: bytes[13..end].to_vec(),
    })
}

/// Append a u16 LE length-prefixed string.
pub(crate) fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_bytes(buf, s.as_bytes());
}

/// Append u16 LE length-prefixed bytes.
pub(crate) fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Split a u16 LE length-prefixed field off the front of `data`.
///
/// Returns `(field, rest)`, or `None` if the buffer is too short.
pub(crate) fn take_prefixed(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if data.len() < 2 {
        return None;
    }
    let len = usize::from(u16::from_le_bytes([data[0], data[1]]));
    let rest = &data[2..];
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}
