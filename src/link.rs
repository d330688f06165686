//! Link-side entry points, invoked by the wireless stack's event loop.
//!
//! The stack identifies a connected station by its device object path
//! (bluez style, e.g. `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`); this
//! resolves to the station's link address. A failure on this path must
//! never propagate into the event loop (it also serves other
//! peripherals), so every handler logs and drops, and a failed read
//! answers with the empty sentinel.

use crate::codec;
use crate::registry::StationRegistry;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Extracts the station address from a device object path: the segment
/// after the last `dev_` marker, underscores replaced with colons,
/// lowercased. A bare address passes through unchanged.
pub fn resolve_device_address(device: &str) -> String {
    let address = match device.rfind("dev_") {
        Some(index) => &device[index + "dev_".len()..],
        None => device,
    };
    StationRegistry::normalize_address(&address.replace('_', ":"))
}

#[derive(Debug, Clone)]
pub struct LinkHandler {
    registry: Arc<StationRegistry>,
}

impl LinkHandler {
    pub fn new(registry: Arc<StationRegistry>) -> Self {
        Self { registry }
    }

    /// Read on the schedule channel: the station's next observation as
    /// a 40-byte record, or the empty sentinel when nothing is
    /// scheduled or the station is unknown.
    pub async fn on_schedule_read(&self, device: &str) -> Vec<u8> {
        let address = resolve_device_address(device);
        let now = epoch_millis();
        match self.registry.next_observation(&address, now).await {
            Ok(Some(request)) => {
                info!(%address, start = request.start_time_millis, "handing out observation");
                codec::encode_observation(&request).to_vec()
            }
            Ok(None) => {
                debug!(%address, "no observation scheduled");
                codec::empty_observation().to_vec()
            }
            Err(e) => {
                warn!(%address, error = %e, "schedule read from unconfigured device");
                codec::empty_observation().to_vec()
            }
        }
    }

    /// Write on the schedule channel: a captured frame.
    pub async fn on_schedule_write(&self, device: &str, payload: &[u8]) {
        let address = resolve_device_address(device);
        let frame = match codec::decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%address, error = %e, "dropping frame write");
                return;
            }
        };
        match self.registry.append_frame(&address, frame).await {
            Ok(()) => info!(%address, "frame stored"),
            Err(e) => warn!(%address, error = %e, "dropping frame from unknown station"),
        }
    }

    /// Write on the battery channel: a percentage report.
    pub async fn on_battery_write(&self, device: &str, payload: &[u8]) {
        let address = resolve_device_address(device);
        let level = match codec::decode_battery_level(payload) {
            Ok(level) => level,
            Err(e) => {
                warn!(%address, error = %e, "dropping battery report");
                return;
            }
        };
        match self.registry.set_battery_level(&address, level).await {
            Ok(()) => debug!(%address, level, "battery level updated"),
            Err(e) => warn!(%address, error = %e, "dropping battery report from unknown station"),
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
