//! SacpClient struct and public API.

use super::io::{read_frame, write_frame};
use super::protocol::put_string;
use super::transfer::{UploadPlan, parse_chunk_request};
use super::types::{CMD_HELLO, CMD_SESSION_END, CMD_UPLOAD_BEGIN, CMD_UPLOAD_CHUNK, CMD_UPLOAD_DONE, Frame};
use crate::error::{AppError, Result};
use crate::progress::{Progress, ProgressFn};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Timeout for the best-effort session-end notice.
const SESSION_END_TIMEOUT: Duration = Duration::from_secs(2);

/// SACP client owning one TCP session with a device.
pub struct SacpClient {
    stream: Option<TcpStream>,
    ip: String,
    port: u16,
    client_name: String,
    timeout_duration: Duration,
    read_timeout: Duration,
}

impl SacpClient {
    /// Create a new client.
    ///
    /// `timeout_duration` bounds the dial, handshake reads and writes;
    /// `read_timeout` bounds each read while an upload is running.
    pub fn new(ip: &str, port: u16, client_name: &str, timeout_duration: Duration, read_timeout: Duration) -> Self {
        Self {
            stream: None,
            ip: ip.to_string(),
            port,
            client_name: client_name.to_string(),
            timeout_duration,
            read_timeout,
        }
    }

    /// Dial the device and perform the hello exchange.
    pub async fn connect(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.ip, self.port);
        info!("SACP connecting to {} (timeout={:?})", addr, self.timeout_duration);

        let mut stream = timeout(self.timeout_duration, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                error!("Connection timeout to {addr}");
                AppError::HandshakeFailed(format!("connection timeout to {addr}"))
            })?
            .map_err(|e| {
                error!("Failed to connect to {addr}: {e}");
                AppError::HandshakeFailed(format!("failed to connect to {addr}: {e}"))
            })?;

        self.handshake(&mut stream)
            .await
            .map_err(|e| AppError::HandshakeFailed(format!("{addr}: {e}")))?;

        info!("SACP session established with {addr}");
        self.stream = Some(stream);
        Ok(())
    }

    /// Send hello and wait for the device's hello, discarding other chatter.
    async fn handshake(&self, stream: &mut TcpStream) -> Result<()> {
        let hello = Frame::request(CMD_HELLO, 1, hello_data(&self.client_name));
        write_frame(stream, &hello, self.timeout_duration).await?;

        loop {
            let frame = read_frame(stream, self.timeout_duration).await?;
            if frame.command() == CMD_HELLO {
                return Ok(());
            }
            debug!(
                "Discarding {:02X}/{:02X} during handshake",
                frame.command_set, frame.command_id
            );
        }
    }

    /// Send the session-end notice and drop the socket.
    ///
    /// Failures are logged; the socket is closed either way.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            info!("Disconnecting from SACP device");
            let end = Frame::request(CMD_SESSION_END, 1, Vec::new());
            if let Err(e) = write_frame(&mut stream, &end, SESSION_END_TIMEOUT).await {
                warn!("SACP session-end notice failed: {e}");
            }
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    /// Check if a session is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Transfer one file; the device pulls chunks until it reports completion.
    pub async fn upload(&mut self, name: &str, content: &[u8], progress: Option<&ProgressFn>) -> Result<()> {
        let write_timeout = self.timeout_duration;
        let read_timeout = self.read_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AppError::UploadIo("not connected".to_string()))?;

        let plan = UploadPlan::new(name, content)?;
        info!(
            "SACP upload '{}' ({} bytes, {} chunks, md5={})",
            name,
            content.len(),
            plan.chunk_count,
            plan.md5_hex
        );

        let begin = Frame::request(CMD_UPLOAD_BEGIN, 1, plan.begin_data());
        write_frame(stream, &begin, write_timeout).await?;

        loop {
            let frame = read_frame(stream, read_timeout).await?;

            match frame.command() {
                CMD_UPLOAD_BEGIN => {
                    debug!("Upload acknowledged");
                }
                CMD_UPLOAD_CHUNK => {
                    let index = parse_chunk_request(&frame.data)?;
                    let data = plan.chunk_response_data(index)?;
                    let reply = Frame::response(CMD_UPLOAD_CHUNK, frame.sequence, data);
                    write_frame(stream, &reply, write_timeout).await?;

                    let sent = Progress::Chunks {
                        sent: u32::from(index) + 1,
                        total: u32::from(plan.chunk_count),
                    };
                    debug!("Sent chunk {}/{} ({sent})", index + 1, plan.chunk_count);
                    if let Some(progress) = progress {
                        progress(sent);
                    }
                }
                CMD_UPLOAD_DONE => {
                    if frame.data == [0x00] {
                        info!("Device accepted '{name}'");
                        let end = Frame::request(CMD_SESSION_END, 1, Vec::new());
                        write_frame(stream, &end, write_timeout).await?;
                        return Ok(());
                    }
                    // Not terminal: keep serving until the device reports success
                    warn!("Unexpected upload completion payload: {:02X?}", frame.data);
                }
                (set, id) => {
                    debug!("Ignoring {set:02X}/{id:02X} during upload");
                }
            }
        }
    }
}

/// Hello data: client name(prefixed) + two reserved zero u16 fields.
pub(crate) fn hello_data(client_name: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + client_name.len() + 4);
    put_string(&mut data, client_name);
    data.extend_from_slice(&[0, 0, 0, 0]);
    data
}
