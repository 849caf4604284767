//! Scripted SACP and HTTP peers shared by the session tests.

use crate::config::AppConfig;
use crate::sacp::Frame;
use crate::sacp::io::{read_frame, write_frame};
use crate::sacp::protocol::put_string;
use crate::sacp::types::{CMD_HELLO, CMD_SESSION_END, CMD_UPLOAD_BEGIN, CMD_UPLOAD_CHUNK, CMD_UPLOAD_DONE};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// How the scripted SACP device behaves after the handshake.
#[derive(Clone, Copy)]
pub(crate) enum Script {
    Accept,
    BadChunkRequest,
    Silent,
}

pub(crate) async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub(crate) fn test_config(sacp_port: u16, http_port: u16) -> AppConfig {
    let mut config = AppConfig::default();
    config.device.sacp_port = sacp_port;
    config.device.http_port = http_port;
    config.device.connect_timeout_secs = 2;
    config.device.ping_timeout_ms = 500;
    config.sacp.read_timeout_secs = 5;
    config
}

/// Scripted SACP device. Accepts connections until one performs the hello
/// exchange, then runs `script` for a single-chunk upload. Returns whether a session-end frame arrived afterwards.
pub(crate) async fn spawn_sacp_device(script: Script) -> (u16, JoinHandle<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut stream = loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Reachability probes connect and close without a hello
            if let Ok(hello) = read_frame(&mut stream, IO_TIMEOUT).await {
                assert_eq!(hello.command(), CMD_HELLO);
                let answer = Frame::response(CMD_HELLO, hello.sequence, vec![0]);
                write_frame(&mut stream, &answer, IO_TIMEOUT).await.unwrap();
                break stream;
            }
        };
        run_script(&mut stream, script).await;
        saw_session_end(&mut stream).await
    });
    (port, handle)
}

async fn run_script(stream: &mut TcpStream, script: Script) {
    let begin = read_frame(stream, IO_TIMEOUT).await.unwrap();
    assert_eq!(begin.command(), CMD_UPLOAD_BEGIN);

    match script {
        Script::Accept => {
            let mut request = Vec::new();
            put_string(&mut request, "ignored");
            request.extend_from_slice(&0u16.to_le_bytes());
            let ask = Frame::request(CMD_UPLOAD_CHUNK, 7, request);
            write_frame(stream, &ask, IO_TIMEOUT).await.unwrap();
            let reply = read_frame(stream, IO_TIMEOUT).await.unwrap();
            assert_eq!(reply.sequence, 7);

            let done = Frame::request(CMD_UPLOAD_DONE, 8, vec![0]);
            write_frame(stream, &done, IO_TIMEOUT).await.unwrap();
        }
        Script::BadChunkRequest => {
            let ask = Frame::request(CMD_UPLOAD_CHUNK, 7, vec![0xFF]);
            write_frame(stream, &ask, IO_TIMEOUT).await.unwrap();
        }
        Script::Silent => {}
    }
}

async fn saw_session_end(stream: &mut TcpStream) -> bool {
    while let Ok(frame) = read_frame(stream, Duration::from_secs(5)).await {
        if frame.command() == CMD_SESSION_END {
            return true;
        }
    }
    false
}

/// One request as seen by the scripted HTTP server.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

pub(crate) type Log = Arc<Mutex<Vec<Recorded>>>;

/// Scripted HTTP answer, optionally held back for `delay`.
pub(crate) struct Reply {
    status: u16,
    body: String,
    delay: Duration,
}

impl Reply {
    pub(crate) fn delayed(status: u16, body: &str, delay: Duration) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay,
        }
    }
}

impl From<(u16, String)> for Reply {
    fn from((status, body): (u16, String)) -> Self {
        Self {
            status,
            body,
            delay: Duration::ZERO,
        }
    }
}

/// Scripted HTTP/1.1 server answering each connection via `route`.
pub(crate) async fn spawn_http_server<R, T>(route: R) -> (u16, Log)
where
    R: FnMut(&Recorded) -> T + Send + 'static,
    T: Into<Reply> + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let route = Arc::new(Mutex::new(route));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let route = route.clone();
            let sink = sink.clone();
            tokio::spawn(async move {
                let _ = serve_http(stream, &route, &sink).await;
            });
        }
    });
    (port, log)
}

async fn serve_http<R, T>(stream: TcpStream, route: &Mutex<R>, log: &Log) -> Option<()>
where
    R: FnMut(&Recorded) -> T,
    T: Into<Reply>,
{
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));

    let mut content_length = 0usize;
    let mut chunked = false;
    let mut content_type = String::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await.ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        let (name, value) = header.split_once(':')?;
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "content-length" => content_length = value.parse().ok()?,
            "transfer-encoding" => chunked = value.eq_ignore_ascii_case("chunked"),
            "content-type" => content_type = value.to_string(),
            _ => {}
        }
    }

    let mut body = Vec::new();
    if chunked {
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).await.ok()?;
            let size = usize::from_str_radix(size_line.trim(), 16).ok()?;
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).await.ok()?;
            if size == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..size]);
        }
    } else {
        body.resize(content_length, 0);
        reader.read_exact(&mut body).await.ok()?;
    }

    let recorded = Recorded {
        method,
        path: path.to_string(),
        query: query.to_string(),
        content_type,
        body,
    };
    let reply: Reply = {
        let mut route = route.lock().unwrap();
        (*route)(&recorded).into()
    };
    log.lock().unwrap().push(recorded);

    tokio::time::sleep(reply.delay).await;
    let response = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await.ok()?;
    stream.shutdown().await.ok()?;
    Some(())
}

pub(crate) fn requests_to(log: &Log, path: &str) -> Vec<Recorded> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|r| r.path == path)
        .cloned()
        .collect()
}
