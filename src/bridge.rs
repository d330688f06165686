//! TCP bridge between the wireless-stack daemon and the link handlers.
//!
//! The stack daemon owns the radio hardware and its event loop; it
//! connects here and forwards characteristic reads and writes. Messages
//! are length-prefixed binary:
//!
//! ```text
//! request:  [u32 BE total][op u8][addr_len u8][device id][payload...]
//! response: [u32 BE total][payload...]        (schedule reads only)
//! ```
//!
//! Writes are fire-and-forget, matching the link's no-retransmission
//! semantics. A malformed message closes the connection; the daemon
//! reconnects on its own schedule.

use crate::link::LinkHandler;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

pub const OP_SCHEDULE_READ: u8 = 0x01;
pub const OP_SCHEDULE_WRITE: u8 = 0x02;
pub const OP_BATTERY_WRITE: u8 = 0x03;

/// Largest accepted bridge message; protects against a runaway length
/// prefix from a confused peer.
const MAX_MESSAGE_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub op: u8,
    pub device: String,
    pub payload: Vec<u8>,
}

/// Parses one bridge message body (the bytes after the length prefix).
pub fn parse_message(body: &[u8]) -> Option<BridgeRequest> {
    let (&op, rest) = body.split_first()?;
    let (&addr_len, rest) = rest.split_first()?;
    let addr_len = addr_len as usize;
    if rest.len() < addr_len {
        return None;
    }
    let device = std::str::from_utf8(&rest[..addr_len]).ok()?.to_string();
    Some(BridgeRequest {
        op,
        device,
        payload: rest[addr_len..].to_vec(),
    })
}

/// Encodes a bridge message body for the request side; the operator CLI
/// and test harnesses share this with the daemon shim.
///
/// Returns `None` when the device identifier does not fit the one-byte
/// length field; such a message could only misparse on the other end.
pub fn encode_message(op: u8, device: &str, payload: &[u8]) -> Option<Vec<u8>> {
    if device.len() > usize::from(u8::MAX) {
        return None;
    }
    let body_len = 2 + device.len() + payload.len();
    let mut out = Vec::with_capacity(4 + body_len);
    out.extend_from_slice(&(body_len as u32).to_be_bytes());
    out.push(op);
    out.push(device.len() as u8);
    out.extend_from_slice(device.as_bytes());
    out.extend_from_slice(payload);
    Some(out)
}

pub async fn serve(listener: TcpListener, handler: LinkHandler) -> io::Result<()> {
    info!("link bridge listening on {}", listener.local_addr()?);
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("wireless stack connected from {}", addr);
                let conn_handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, conn_handler).await {
                        warn!("bridge connection {} closed: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("failed to accept bridge connection: {}", e);
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, handler: LinkHandler) -> io::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            // Clean disconnect between messages.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 || len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bridge message length {} out of range", len),
            ));
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;

        let request = match parse_message(&body) {
            Some(request) => request,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unparseable bridge message",
                ));
            }
        };

        match request.op {
            OP_SCHEDULE_READ => {
                let response = handler.on_schedule_read(&request.device).await;
                stream
                    .write_all(&(response.len() as u32).to_be_bytes())
                    .await?;
                stream.write_all(&response).await?;
            }
            OP_SCHEDULE_WRITE => {
                handler
                    .on_schedule_write(&request.device, &request.payload)
                    .await;
            }
            OP_BATTERY_WRITE => {
                handler
                    .on_battery_write(&request.device, &request.payload)
                    .await;
            }
            op => {
                warn!(op, device = %request.device, "ignoring unknown bridge op");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trip() {
        let encoded = encode_message(OP_SCHEDULE_WRITE, "aa:bb:cc:dd:ee:ff", &[1, 2, 3]).unwrap();
        let len = u32::from_be_bytes(encoded[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, encoded.len() - 4);

        let request = parse_message(&encoded[4..]).unwrap();
        assert_eq!(request.op, OP_SCHEDULE_WRITE);
        assert_eq!(request.device, "aa:bb:cc:dd:ee:ff");
        assert_eq!(request.payload, vec![1, 2, 3]);
    }

    #[test]
    fn empty_payload_is_allowed() {
        let encoded = encode_message(OP_SCHEDULE_READ, "aa:bb", &[]).unwrap();
        let request = parse_message(&encoded[4..]).unwrap();
        assert_eq!(request.op, OP_SCHEDULE_READ);
        assert!(request.payload.is_empty());
    }

    #[test]
    fn oversized_device_id_is_refused() {
        let device = "a".repeat(256);
        assert!(encode_message(OP_SCHEDULE_READ, &device, &[]).is_none());
        // 255 bytes is the largest the length field can carry.
        assert!(encode_message(OP_SCHEDULE_READ, &device[..255], &[]).is_some());
    }

    #[test]
    fn truncated_address_fails_to_parse() {
        // Declares a 16-byte address but carries only 5 bytes.
        let body = [OP_SCHEDULE_READ, 16, b'a', b'a', b':', b'b', b'b'];
        assert!(parse_message(&body).is_none());
    }

    #[test]
    fn empty_body_fails_to_parse() {
        assert!(parse_message(&[]).is_none());
    }
}
