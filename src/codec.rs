//! Fixed-layout binary codec for the wireless notification channel.
//!
//! Outbound observation record (40 bytes, big-endian, no padding):
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────┬─────┬────┬────┬──────┬───────┬──────────┬──────┬──────┐
//! │ start 8B │  end 8B  │ now 8B   │ freq │ bw  │ sf │ cr │ sync │ power │ preamble │ gain │ ldro │
//! │ u64      │ u64      │ u64      │ f32  │ f32 │ u8 │ u8 │ u8   │ i8    │ u16      │ u8   │ u8   │
//! └──────────┴──────────┴──────────┴──────┴─────┴────┴────┴──────┴───────┴──────────┴──────┴──────┘
//! ```
//!
//! Inbound frame: 22-byte header (freqError i32, rssi i16, snr f32,
//! timestamp u64, dataLength u32) followed by exactly dataLength payload
//! bytes. The link has no retransmission, so a short read is simply a
//! malformed frame.

use crate::protocol::{Frame, ObservationRequest};
use thiserror::Error;

/// Size of an encoded observation record.
pub const OBSERVATION_LEN: usize = 40;

/// Size of the fixed frame header preceding the payload.
pub const FRAME_HEADER_LEN: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed frame: got {got} bytes, need {need}")]
    MalformedFrame { got: usize, need: usize },
    #[error("malformed battery report: empty payload")]
    MalformedBatteryReport,
}

/// Encodes an observation request into the fixed 40-byte record.
///
/// Infallible for field values within their declared widths; callers
/// range-check before encoding. `current_time_millis` encodes as zero
/// when the request was never stamped.
pub fn encode_observation(req: &ObservationRequest) -> [u8; OBSERVATION_LEN] {
    let mut out = [0u8; OBSERVATION_LEN];
    out[0..8].copy_from_slice(&req.start_time_millis.to_be_bytes());
    out[8..16].copy_from_slice(&req.end_time_millis.to_be_bytes());
    out[16..24].copy_from_slice(&req.current_time_millis.unwrap_or(0).to_be_bytes());
    out[24..28].copy_from_slice(&req.freq.to_be_bytes());
    out[28..32].copy_from_slice(&req.bw.to_be_bytes());
    out[32] = req.sf;
    out[33] = req.cr;
    out[34] = req.sync_word;
    out[35] = req.power as u8;
    out[36..38].copy_from_slice(&req.preamble_length.to_be_bytes());
    out[38] = req.gain;
    out[39] = req.ldro;
    out
}

/// Sentinel for "nothing scheduled": distinguishable from any valid
/// record by length alone.
pub fn empty_observation() -> &'static [u8] {
    &[]
}

/// Decodes an inbound telemetry frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(CodecError::MalformedFrame {
            got: bytes.len(),
            need: FRAME_HEADER_LEN,
        });
    }

    let frequency_error = i32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let rssi = i16::from_be_bytes(bytes[4..6].try_into().unwrap());
    let snr = f32::from_be_bytes(bytes[6..10].try_into().unwrap());
    let timestamp_millis = u64::from_be_bytes(bytes[10..18].try_into().unwrap());
    let data_length = u32::from_be_bytes(bytes[18..22].try_into().unwrap()) as usize;

    let need = FRAME_HEADER_LEN + data_length;
    if bytes.len() < need {
        return Err(CodecError::MalformedFrame {
            got: bytes.len(),
            need,
        });
    }

    Ok(Frame {
        frequency_error,
        rssi,
        snr,
        timestamp_millis,
        data: bytes[FRAME_HEADER_LEN..need].to_vec(),
    })
}

/// Decodes a battery-level report: the first byte of the payload.
pub fn decode_battery_level(bytes: &[u8]) -> Result<u8, CodecError> {
    bytes.first().copied().ok_or(CodecError::MalformedBatteryReport)
}
