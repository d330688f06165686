//! Operator-facing HTTP control surface.
//!
//! A deliberately small HTTP/1.1 implementation over the tokio listener:
//! one request per connection, JSON in and out. Routing is factored out
//! of the socket handling so it can be exercised directly in tests.

use crate::config::Config;
use crate::protocol::ObservationRequest;
use crate::registry::{RegistryError, StationRegistry};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const MAX_BODY_SIZE: usize = 1024 * 1024;

/// A peer gets this long to deliver a complete request before the
/// connection is given up on. Keeps a stalled sender (e.g. one that
/// advertises a Content-Length it never fills) from parking the task
/// in a read forever.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state behind the control API: the registry plus the
/// authoritative configuration file, rewritten on registration.
pub struct ControlState {
    registry: Arc<StationRegistry>,
    config: Mutex<Config>,
    config_path: PathBuf,
}

impl ControlState {
    pub fn new(registry: Arc<StationRegistry>, config: Config, config_path: PathBuf) -> Self {
        Self {
            registry,
            config: Mutex::new(config),
            config_path,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    fn status_only(status: u16) -> Self {
        Self {
            status,
            body: format!(r#"{{"status":{}}}"#, status),
        }
    }

    fn with_message(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "status": status, "message": message });
        Self {
            status,
            body: body.to_string(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            _ => "Internal Server Error",
        }
    }
}

pub async fn serve(listener: TcpListener, state: Arc<ControlState>) -> io::Result<()> {
    info!("control API listening on {}", listener.local_addr()?);
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let conn_state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, conn_state).await {
                        warn!("control connection {} failed: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("failed to accept control connection: {}", e);
            }
        }
    }
}

enum RequestRead {
    Complete {
        method: String,
        target: String,
        body: String,
    },
    Rejected(Response),
    Closed,
}

async fn handle_connection(stream: TcpStream, state: Arc<ControlState>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request(&mut reader)).await;
    let (method, target, body) = match read {
        Ok(Ok(RequestRead::Complete {
            method,
            target,
            body,
        })) => (method, target, body),
        Ok(Ok(RequestRead::Rejected(response))) => {
            write_response(&mut writer, &response).await?;
            return Ok(());
        }
        Ok(Ok(RequestRead::Closed)) => return Ok(()),
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            write_response(&mut writer, &Response::with_message(408, "request read timed out"))
                .await?;
            return Ok(());
        }
    };

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target.as_str(), ""),
    };

    let response = route(&state, &method, path, query, &body).await;
    info!("{} {} -> {}", method, target, response.status);
    write_response(&mut writer, &response).await
}

async fn read_request(
    reader: &mut (impl AsyncBufReadExt + Unpin),
) -> io::Result<RequestRead> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(RequestRead::Closed);
    }
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target.to_string()),
        _ => {
            return Ok(RequestRead::Rejected(Response::with_message(
                400,
                "malformed request line",
            )))
        }
    };

    // Headers: only Content-Length matters here.
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(RequestRead::Closed);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    if content_length > MAX_BODY_SIZE {
        return Ok(RequestRead::Rejected(Response::with_message(
            400,
            "request body too large",
        )));
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(RequestRead::Complete {
        method,
        target,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn write_response(
    writer: &mut (impl AsyncWriteExt + Unpin),
    response: &Response,
) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.reason(),
        response.body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(response.body.as_bytes()).await?;
    writer.flush().await
}

/// Dispatches one control request. Public so tests can drive the API
/// without a socket.
pub async fn route(
    state: &ControlState,
    method: &str,
    path: &str,
    query: &str,
    body: &str,
) -> Response {
    match (method, path) {
        ("GET", "/api/v1/status") => status(state).await,
        ("GET", "/api/v1/data") => data(state, query).await,
        ("POST", "/api/v1/schedule") => schedule(state, query, body).await,
        ("POST", "/api/v1/client") => register_client(state, query).await,
        ("GET" | "POST", _) => Response::status_only(404),
        _ => Response::status_only(405),
    }
}

async fn status(state: &ControlState) -> Response {
    let snapshots = state.registry.list().await;
    match serde_json::to_string(&snapshots) {
        Ok(body) => Response::ok(body),
        Err(e) => Response::with_message(500, &e.to_string()),
    }
}

async fn data(state: &ControlState, query: &str) -> Response {
    let client = match query_param(query, "client") {
        Some(client) => client,
        None => return Response::with_message(400, "'client' parameter is missing"),
    };
    match state.registry.drain_frames(&client).await {
        Ok(frames) => match serde_json::to_string(&frames) {
            Ok(body) => Response::ok(body),
            Err(e) => Response::with_message(500, &e.to_string()),
        },
        Err(RegistryError::UnknownStation(_)) => {
            Response::with_message(400, "unknown client address")
        }
    }
}

async fn schedule(state: &ControlState, query: &str, body: &str) -> Response {
    let client = match query_param(query, "client") {
        Some(client) => client,
        None => return Response::with_message(400, "'client' parameter is missing"),
    };
    let requests: Vec<ObservationRequest> = match serde_json::from_str(body) {
        Ok(requests) => requests,
        Err(e) => return Response::with_message(400, &format!("invalid schedule: {}", e)),
    };
    if let Some(bad) = requests
        .iter()
        .find(|r| r.start_time_millis >= r.end_time_millis)
    {
        return Response::with_message(
            400,
            &format!(
                "invalid observation window: start {} is not before end {}",
                bad.start_time_millis, bad.end_time_millis
            ),
        );
    }
    match state.registry.set_schedule(&client, requests).await {
        Ok(()) => Response::status_only(200),
        Err(RegistryError::UnknownStation(_)) => {
            Response::with_message(400, "unknown client address")
        }
    }
}

async fn register_client(state: &ControlState, query: &str) -> Response {
    let client = query_param(query, "client");
    let min_freq = query_param(query, "minFreq").and_then(|v| v.parse::<u64>().ok());
    let max_freq = query_param(query, "maxFreq").and_then(|v| v.parse::<u64>().ok());

    let (client, min_freq, max_freq) = match (client, min_freq, max_freq) {
        (Some(client), Some(min_freq), Some(max_freq)) => (client, min_freq, max_freq),
        _ => {
            return Response::with_message(
                400,
                "'client', 'minFreq' and 'maxFreq' parameters are required",
            )
        }
    };
    if min_freq >= max_freq {
        return Response::with_message(400, "minFreq must be below maxFreq");
    }

    let address = StationRegistry::normalize_address(&client);

    // Band bounds are fixed at first registration. A repeat request is
    // acknowledged but must not rewrite the persisted bounds, or the
    // file and the live registry would diverge until the next restart.
    if state.registry.contains(&address).await {
        return Response::status_only(200);
    }
    state.registry.register(&address, min_freq, max_freq).await;

    // The file stays authoritative across restarts. A persist failure
    // keeps the in-memory registration and is surfaced in the log only.
    let mut config = state.config.lock().await;
    config.add_client(&address, min_freq, max_freq);
    if let Err(e) = config.save(&state.config_path) {
        error!("failed to persist configuration: {}", e);
    }

    Response::status_only(200)
}

/// Minimal query-string lookup with percent-decoding, enough for the
/// parameters this API takes.
fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == name {
            Some(percent_decode(value))
        } else {
            None
        }
    })
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let escape = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match escape.and_then(|e| u8::from_str_radix(e, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
