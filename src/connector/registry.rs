//! Handler selection and the Connect -> Upload -> Disconnect sequence.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::handler::{Handler, HttpHandler, Protocol, SacpHandler};
use crate::config::AppConfig;
use crate::device::Device;
use crate::error::{AppError, Result};
use crate::payload::Payload;
use crate::progress::ProgressFn;

/// Ordered set of protocol handlers.
pub struct Registry {
    handlers: Vec<Handler>,
    progress: Option<ProgressFn>,
}

impl Registry {
    /// Registry with the stock order: SACP first, then HTTP.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_handlers(vec![
            Handler::Sacp(SacpHandler::new(config)),
            Handler::Http(HttpHandler::new(config)),
        ])
    }

    /// Registry probing `handlers` in the given order.
    pub fn with_handlers(handlers: Vec<Handler>) -> Self {
        Self {
            handlers,
            progress: None,
        }
    }

    /// Forward upload progress to `progress`.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Upload `payload` to `device` with the first handler that reaches it.
    ///
    /// `device` is updated with the handler's working copy (token changes)
    /// once a session was attempted.
    pub async fn upload(&mut self, device: &mut Device, payload: &Payload, cancel: &CancellationToken) -> Result<Protocol> {
        payload.validate()?;

        let progress = self.progress.clone();
        let handler = self.select(device).await?;
        let protocol = handler.protocol();
        info!("Uploading '{}' to {device} via {protocol}", payload.name());

        let connected = tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = handler.connect() => result,
        };
        if let Err(e) = connected {
            *device = handler.device();
            return Err(e);
        }

        let uploaded = tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = handler.upload(payload, progress) => result,
        };

        if let Err(e) = handler.disconnect().await {
            warn!("Disconnect from {device} failed: {e}");
        }
        *device = handler.device();

        uploaded.map(|()| protocol)
    }

    async fn select(&mut self, device: &Device) -> Result<&mut Handler> {
        let mut chosen = None;
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            if handler.ping(device).await {
                chosen = Some(index);
                break;
            }
        }
        match chosen {
            Some(index) => Ok(&mut self.handlers[index]),
            None => Err(AppError::DeviceUnavailable(device.to_string())),
        }
    }
}
