//! Chunked upload planning and chunk request/response payloads.

use super::protocol::{put_bytes, put_string, take_prefixed};
use super::types::CHUNK_SIZE;
use crate::error::{AppError, Result};
use md5::{Digest, Md5};

/// Everything the device needs to pull a file chunk by chunk.
pub(crate) struct UploadPlan<'a> {
    pub name: &'a str,
    pub content: &'a [u8],
    pub md5_hex: String,
    pub chunk_count: u16,
}

impl<'a> UploadPlan<'a> {
    pub(crate) fn new(name: &'a str, content: &'a [u8]) -> Result<Self> {
        let chunk_count = u16::try_from(chunk_count(content.len()))
            .map_err(|_| AppError::PayloadTooLarge(content.len() as u64))?;
        if u32::try_from(content.len()).is_err() {
            return Err(AppError::PayloadTooLarge(content.len() as u64));
        }

        Ok(Self {
            name,
            content,
            md5_hex: md5_hex(content),
            chunk_count,
        })
    }

    /// Data of the begin-upload request.
    ///
    /// name(prefixed) + total length(u32 LE) + chunk count(u16 LE) + md5 hex(prefixed)
    pub(crate) fn begin_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(2 + self.name.len() + 4 + 2 + 2 + self.md5_hex.len());
        put_string(&mut data, self.name);
        data.extend_from_slice(&(self.content.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.chunk_count.to_le_bytes());
        put_string(&mut data, &self.md5_hex);
        data
    }

    /// Data answering a chunk request.
    ///
    /// status(0) + md5 hex(prefixed) + index(u16 LE) + chunk(prefixed)
    pub(crate) fn chunk_response_data(&self, index: u16) -> Result<Vec<u8>> {
        let chunk = select_chunk(self.content, index, self.chunk_count).ok_or_else(|| {
            AppError::MalformedChunkRequest(format!(
                "chunk {index} requested but only {} planned",
                self.chunk_count
            ))
        })?;

        let mut data = Vec::with_capacity(1 + 2 + self.md5_hex.len() + 2 + 2 + chunk.len());
        data.push(0);
        put_string(&mut data, &self.md5_hex);
        data.extend_from_slice(&index.to_le_bytes());
        put_bytes(&mut data, chunk);
        Ok(data)
    }
}

/// Number of chunks announced for `len` bytes.
///
/// Always `len / CHUNK_SIZE + 1`, so an exact multiple announces a final
/// empty chunk. Devices expect this count.
pub(crate) fn chunk_count(len: usize) -> usize {
    len / CHUNK_SIZE + 1
}

/// Slice served for chunk `index`; the last chunk carries the remainder.
pub(crate) fn select_chunk(content: &[u8], index: u16, chunk_count: u16) -> Option<&[u8]> {
    if index >= chunk_count {
        return None;
    }
    let start = usize::from(index) * CHUNK_SIZE;
    if index == chunk_count - 1 {
        content.get(start..)
    } else {
        content.get(start..start + CHUNK_SIZE)
    }
}

/// Requested chunk index from a device chunk request.
///
/// Layout: md5 hex(prefixed) + index(u16 LE). The digest is not checked.
pub(crate) fn parse_chunk_request(data: &[u8]) -> Result<u16> {
    let (_md5, rest) = take_prefixed(data)
        .ok_or_else(|| AppError::MalformedChunkRequest(format!("digest field truncated ({} bytes)", data.len())))?;
    if rest.len() < 2 {
        return Err(AppError::MalformedChunkRequest(format!(
            "index field truncated ({} bytes)",
            rest.len()
        )));
    }
    Ok(u16::from_le_bytes([rest[0], rest[1]]))
}

/// Lower-case hex MD5 of the content.
pub(crate) fn md5_hex(content: &[u8]) -> String {
    hex::encode(Md5::digest(content))
}
