//! Low-level socket I/O operations with timeout handling.

use super::error::FrameError;
use super::protocol::{decode_frame, encode_frame};
use super::types::{Frame, MAGIC, PREFIX_SIZE};
use crate::error::{AppError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, error};

/// Encode and write one frame with timeout.
pub(crate) async fn write_frame<S>(stream: &mut S, frame: &Frame, timeout_duration: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let packet = encode_frame(frame)?;
    debug!(
        "SACP TX {:02X}/{:02X} seq={} ({} bytes)",
        frame.command_set,
        frame.command_id,
        frame.sequence,
        packet.len()
    );

    timeout(timeout_duration, async {
        stream.write_all(&packet).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| AppError::UploadTimeout("write timeout".to_string()))?
    .map_err(|e| {
        error!("SACP write failed: {e}");
        AppError::UploadIo(format!("write failed: {e}"))
    })
}

/// Read one complete frame with timeout.
///
/// The same deadline bounds both the prefix and the remainder.
pub(crate) async fn read_frame<S>(stream: &mut S, timeout_duration: Duration) -> Result<Frame>
where
    S: AsyncRead + Unpin,
{
    let read = async {
        let mut prefix = [0u8; PREFIX_SIZE];
        stream.read_exact(&mut prefix).await?;

        if prefix[0..2] != MAGIC {
            return Ok(Err(FrameError::InvalidMagic));
        }

        // Length covers sender id through trailing checksum; version,
        // receiver id and header checksum precede it.
        let declared = usize::from(u16::from_le_bytes([prefix[2], prefix[3]]));
        let mut packet = vec![0u8; PREFIX_SIZE + declared + 3];
        packet[..PREFIX_SIZE].copy_from_slice(&prefix);
        stream.read_exact(&mut packet[PREFIX_SIZE..]).await?;

        Ok::<_, std::io::Error>(decode_frame(&packet))
    };

    let frame = timeout(timeout_duration, read)
        .await
        .map_err(|_| AppError::UploadTimeout(format!("no frame within {timeout_duration:?}")))?
        .map_err(|e| {
            error!("SACP read failed: {e}");
            AppError::UploadIo(format!("read failed: {e}"))
        })??;

    debug!(
        "SACP RX {:02X}/{:02X} seq={} ({} data bytes)",
        frame.command_set,
        frame.command_id,
        frame.sequence,
        frame.data.len()
    );
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sacp::types::CMD_HELLO;

    #[tokio::test]
    async fn test_write_then_read_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let frame = Frame::request(CMD_HELLO, 7, b"abc".to_vec());

        write_frame(&mut a, &frame, Duration::from_secs(1)).await.unwrap();
        let got = read_frame(&mut b, Duration::from_secs(1)).await.unwrap();

        assert_eq!(got, frame);
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (_a, mut b) = tokio::io::duplex(64);
        let err = read_frame(&mut b, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, AppError::UploadTimeout(_)));
    }

    #[tokio::test]
    async fn test_read_rejects_bad_magic() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0x00, 0x55, 0x08, 0x00]).await.unwrap();
        let err = read_frame(&mut b, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Frame(FrameError::InvalidMagic)));
    }

    #[tokio::test]
    async fn test_read_reports_closed_peer() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let err = read_frame(&mut b, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AppError::UploadIo(_)));
    }
}
