//! Token/approval HTTP session client.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::error::{AppError, Result};
use crate::progress::{ByteProgress, ProgressFn};

/// Path prefix of every API endpoint.
const API_PREFIX: &str = "/api/v1";

/// Size of the pieces the upload body is streamed in.
const BODY_CHUNK_SIZE: usize = 16 * 1024;

/// Called once when the device starts waiting for on-screen approval.
pub type NoticeFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ConnectReply {
    #[serde(default)]
    token: String,
}

/// HTTP session with one device.
///
/// The token is issued by `/connect` and kept across sessions by the caller.
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
    config: HttpConfig,
    notice: NoticeFn,
}

impl HttpClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `ip` - Device address
    /// * `port` - HTTP API port (8080 on stock firmware)
    /// * `token` - Previously issued token, empty if none
    pub fn new(ip: &str, port: u16, token: &str, config: HttpConfig, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self {
            client,
            base_url: format!("http://{ip}:{port}{API_PREFIX}"),
            token: token.to_string(),
            config,
            notice: Arc::new(|| info!("Please tap Yes on the device screen to approve this connection")),
        })
    }

    /// Replace the approval notice.
    pub fn with_notice(mut self, notice: NoticeFn) -> Self {
        self.notice = notice;
        self
    }

    /// Current session token, empty if none.
    pub fn token(&self) -> &str {
        &self.token
    }

    fn url(&self, path: &str) -> String {
        format!("{base}{path}", base = self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        stamped(&self.client, method, &self.url(path), &self.token)
    }

    /// POST with the token repeated as form data.
    fn post_form(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
            .timeout(self.config.request_timeout())
            .form(&[("token", self.token.as_str())])
    }

    /// Obtain a token and wait until the user approves the session.
    pub async fn connect(&mut self) -> Result<()> {
        let mut retries = 0;
        loop {
            info!("HTTP connecting to {}", self.base_url);
            let response = self.post_form("/connect").send().await.map_err(connect_failed)?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.map_err(connect_failed)?;
                    let reply: ConnectReply = serde_json::from_str(&body)
                        .map_err(|e| AppError::ConnectFailed(format!("malformed connect reply: {e}")))?;
                    self.token = reply.token;
                    debug!("Token issued");
                    break;
                }
                StatusCode::FORBIDDEN if !self.token.is_empty() && retries < self.config.connect_retries => {
                    retries += 1;
                    warn!(
                        "Stored token rejected, requesting a new one ({retries}/{})",
                        self.config.connect_retries
                    );
                    self.token.clear();
                    sleep(self.config.retry_backoff()).await;
                }
                status => {
                    return Err(AppError::UnexpectedStatus {
                        operation: "connect",
                        status: status.as_u16(),
                    });
                }
            }
        }

        self.wait_for_approval().await
    }

    async fn wait_for_approval(&self) -> Result<()> {
        let mut noticed = false;
        loop {
            let response = self
                .request(Method::GET, "/status")
                .timeout(self.config.request_timeout())
                .send()
                .await
                .map_err(connect_failed)?;

            match response.status() {
                StatusCode::OK => {
                    info!("HTTP session approved");
                    return Ok(());
                }
                StatusCode::NO_CONTENT => {
                    if !noticed {
                        (self.notice)();
                        noticed = true;
                    }
                    sleep(self.config.poll_interval()).await;
                }
                status => {
                    warn!("Approval refused with status {status}");
                    return Err(AppError::AccessDenied);
                }
            }
        }
    }

    /// Single status request; true when the session is approved.
    pub async fn status(&self) -> Result<bool> {
        let response = self
            .request(Method::GET, "/status")
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }

    /// Upload one file while a heartbeat keeps the session alive.
    pub async fn upload(&self, name: &str, content: Arc<[u8]>, progress: Option<ProgressFn>) -> Result<()> {
        let stop = CancellationToken::new();
        // Cancels the heartbeat if this future is dropped mid-upload
        let _guard = stop.clone().drop_guard();
        let heartbeat = tokio::spawn(heartbeat(
            self.client.clone(),
            self.url("/status"),
            self.token.clone(),
            self.config.clone(),
            stop.clone(),
        ));

        let result = self.send_file(name, content, progress).await;

        stop.cancel();
        if let Err(e) = heartbeat.await {
            warn!("Heartbeat task failed: {e}");
        }
        result
    }

    async fn send_file(&self, name: &str, content: Arc<[u8]>, progress: Option<ProgressFn>) -> Result<()> {
        let total = content.len() as u64;
        info!("HTTP upload '{name}' ({total} bytes)");

        let mut tracker = ByteProgress::new(Some(total), self.config.progress_interval(), progress);
        let pieces = (0..content.len()).step_by(BODY_CHUNK_SIZE).map(move |start| {
            let end = (start + BODY_CHUNK_SIZE).min(content.len());
            tracker.advance((end - start) as u64);
            Ok::<_, std::io::Error>(content[start..end].to_vec())
        });
        let body = Body::wrap_stream(stream::iter(pieces));

        let file = Part::stream_with_length(body, total)
            .file_name(name.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().text("token", self.token.clone()).part("file", file);

        let limit = self.config.upload_timeout();
        let response = self
            .request(Method::POST, "/upload")
            .timeout(limit)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UploadTimeout(format!("no upload reply within {limit:?}"))
                } else {
                    AppError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UnexpectedStatus {
                operation: "upload",
                status: status.as_u16(),
            });
        }
        info!("HTTP upload '{name}' complete");
        Ok(())
    }

    /// End the session. Only sent when a token is held; failures are logged.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.token.is_empty() {
            return Ok(());
        }
        match self.post_form("/disconnect").send().await {
            Ok(response) => debug!("Disconnect answered {}", response.status()),
            Err(e) => warn!("HTTP disconnect failed: {e}"),
        }
        Ok(())
    }
}

/// Request carrying the token and a cache-busting timestamp as query.
fn stamped(client: &Client, method: Method, url: &str, token: &str) -> RequestBuilder {
    let stamp = Utc::now().timestamp().to_string();
    client
        .request(method, url)
        .query(&[("token", token), ("_", stamp.as_str())])
}

/// Poll `/status` until `stop` fires.
async fn heartbeat(client: Client, url: String, token: String, config: HttpConfig, stop: CancellationToken) {
    loop {
        let request = stamped(&client, Method::GET, &url, &token).timeout(config.request_timeout());
        tokio::select! {
            _ = stop.cancelled() => return,
            result = async {
                sleep(config.heartbeat_interval()).await;
                request.send().await
            } => match result {
                Ok(response) => debug!("Heartbeat status {}", response.status()),
                Err(e) => debug!("Heartbeat failed: {e}"),
            },
        }
    }
}

fn connect_failed(e: reqwest::Error) -> AppError {
    AppError::ConnectFailed(e.to_string())
}
