//! Protocol handlers behind one Ping/Connect/Upload/Disconnect contract.

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::AppConfig;
use crate::device::Device;
use crate::error::{AppError, Result};
use crate::http::HttpClient;
use crate::payload::Payload;
use crate::progress::ProgressFn;
use crate::sacp::SacpClient;

/// Wire protocol that served a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Sacp,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Sacp => write!(f, "SACP"),
            Protocol::Http => write!(f, "HTTP"),
        }
    }
}

/// A protocol able to drive one device session.
pub enum Handler {
    Sacp(SacpHandler),
    Http(HttpHandler),
}

impl Handler {
    /// Check whether this protocol can reach `device`, adopting it as the
    /// working copy for the following session.
    pub async fn ping(&mut self, device: &Device) -> bool {
        match self {
            Handler::Sacp(h) => h.ping(device).await,
            Handler::Http(h) => h.ping(device).await,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        match self {
            Handler::Sacp(h) => h.connect().await,
            Handler::Http(h) => h.connect().await,
        }
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        match self {
            Handler::Sacp(h) => h.disconnect().await,
            Handler::Http(h) => h.disconnect().await,
        }
    }

    pub async fn upload(&mut self, payload: &Payload, progress: Option<ProgressFn>) -> Result<()> {
        match self {
            Handler::Sacp(h) => h.upload(payload, progress).await,
            Handler::Http(h) => h.upload(payload, progress).await,
        }
    }

    /// Working copy of the device, including any token issued this session,
    /// even by a connect that was abandoned midway.
    pub fn device(&self) -> Device {
        match self {
            Handler::Sacp(h) => h.device.clone(),
            Handler::Http(h) => h.current_device(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Handler::Sacp(_) => Protocol::Sacp,
            Handler::Http(_) => Protocol::Http,
        }
    }
}

/// True when a TCP connection to `ip:port` opens within `limit`.
async fn reachable(ip: &str, port: u16, limit: Duration) -> bool {
    let addr = format!("{ip}:{port}");
    match timeout(limit, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("{addr} unreachable: {e}");
            false
        }
        Err(_) => {
            debug!("{addr} did not answer within {limit:?}");
            false
        }
    }
}

/// SACP over TCP.
pub struct SacpHandler {
    config: AppConfig,
    device: Device,
    client: Option<SacpClient>,
}

impl SacpHandler {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            device: Device::default(),
            client: None,
        }
    }

    async fn ping(&mut self, device: &Device) -> bool {
        self.device = device.clone();
        reachable(&device.ip, self.config.device.sacp_port, self.config.device.ping_timeout()).await
    }

    async fn connect(&mut self) -> Result<()> {
        let mut client = SacpClient::new(
            &self.device.ip,
            self.config.device.sacp_port,
            &self.config.sacp.client_name,
            self.config.device.connect_timeout(),
            self.config.sacp.read_timeout(),
        );
        client.connect().await?;
        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self.client.take() {
            Some(mut client) => client.disconnect().await,
            None => Ok(()),
        }
    }

    async fn upload(&mut self, payload: &Payload, progress: Option<ProgressFn>) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| AppError::UploadIo("not connected".to_string()))?;
        let content = payload.content().await?;
        client.upload(payload.name(), &content, progress.as_ref()).await
    }
}

/// Token/approval HTTP API.
pub struct HttpHandler {
    config: AppConfig,
    device: Device,
    client: Option<HttpClient>,
}

impl HttpHandler {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            device: Device::default(),
            client: None,
        }
    }

    async fn ping(&mut self, device: &Device) -> bool {
        self.device = device.clone();
        self.client = None;
        if device.sacp {
            return false;
        }
        reachable(&device.ip, self.config.device.http_port, self.config.device.ping_timeout()).await
    }

    async fn connect(&mut self) -> Result<()> {
        let client = HttpClient::new(
            &self.device.ip,
            self.config.device.http_port,
            &self.device.token,
            self.config.http.clone(),
            self.config.device.connect_timeout(),
        )?;
        // Held in place so an abandoned connect keeps the issued token
        let client = self.client.insert(client);
        let result = client.connect().await;
        self.device.token = client.token().to_string();
        if result.is_err() {
            self.client = None;
        }
        result
    }

    fn current_device(&self) -> Device {
        let mut device = self.device.clone();
        if let Some(client) = &self.client {
            device.token = client.token().to_string();
        }
        device
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self.client.take() {
            Some(mut client) => client.disconnect().await,
            None => Ok(()),
        }
    }

    async fn upload(&mut self, payload: &Payload, progress: Option<ProgressFn>) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::ConnectFailed("no HTTP session".to_string()))?;
        let content = payload.content().await?;
        client.upload(payload.name(), content, progress).await
    }
}
