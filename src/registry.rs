//! Station registry: the single source of truth for all station state.
//!
//! Two uncoordinated callers drive this type, control-surface request
//! tasks and link-adapter callbacks, so every public operation is safe
//! for concurrent invocation. Locking is per station: the address map's
//! own lock is held only for lookup/insert, never across a station's
//! read/write body, so one station's traffic never stalls another's.

use crate::protocol::{Frame, ObservationRequest, StationSnapshot};
use crate::scheduler;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// Upper bound on a station's pending-frame queue. The original system
/// is unbounded; this cap trades strict fidelity for bounded memory,
/// discarding the oldest frame with a warning once reached. Operators
/// are expected to poll well before this fills.
pub const MAX_PENDING_FRAMES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown station address: {0}")]
    UnknownStation(String),
}

#[derive(Debug)]
struct Station {
    min_frequency: u64,
    max_frequency: u64,
    schedule: Vec<ObservationRequest>,
    frames: Vec<Frame>,
    battery_level: Option<u8>,
}

#[derive(Debug, Default)]
pub struct StationRegistry {
    stations: RwLock<HashMap<String, Arc<Mutex<Station>>>>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form of a link address. Lookups from every caller go
    /// through this, so mixed-case device identifiers all land on the
    /// same station.
    pub fn normalize_address(address: &str) -> String {
        address.trim().to_ascii_lowercase()
    }

    /// Registers a station, creating it with an empty schedule and no
    /// pending frames. Idempotent: re-registering an existing address
    /// leaves its schedule and frame backlog untouched.
    pub async fn register(&self, address: &str, min_frequency: u64, max_frequency: u64) {
        let address = Self::normalize_address(address);
        let mut stations = self.stations.write().await;
        stations.entry(address).or_insert_with(|| {
            Arc::new(Mutex::new(Station {
                min_frequency,
                max_frequency,
                schedule: Vec::new(),
                frames: Vec::new(),
                battery_level: None,
            }))
        });
    }

    async fn station(&self, address: &str) -> Result<Arc<Mutex<Station>>, RegistryError> {
        let address = Self::normalize_address(address);
        let stations = self.stations.read().await;
        stations
            .get(&address)
            .cloned()
            .ok_or(RegistryError::UnknownStation(address))
    }

    /// Replaces the station's schedule with `requests`, sorted ascending
    /// by start time (stable on ties). Frames and battery state are not
    /// touched.
    pub async fn set_schedule(
        &self,
        address: &str,
        mut requests: Vec<ObservationRequest>,
    ) -> Result<(), RegistryError> {
        let station = self.station(address).await?;
        scheduler::sort_schedule(&mut requests);
        let mut station = station.lock().await;
        station.schedule = requests;
        Ok(())
    }

    /// Picks the next observation for the station at `now`, stamping
    /// `current_time_millis` on the returned copy only.
    pub async fn next_observation(
        &self,
        address: &str,
        now: u64,
    ) -> Result<Option<ObservationRequest>, RegistryError> {
        let station = self.station(address).await?;
        let station = station.lock().await;
        Ok(scheduler::next_observation(&station.schedule, now))
    }

    /// Appends a captured frame to the station's pending queue.
    pub async fn append_frame(&self, address: &str, frame: Frame) -> Result<(), RegistryError> {
        let station = self.station(address).await?;
        let mut station = station.lock().await;
        if station.frames.len() >= MAX_PENDING_FRAMES {
            warn!(
                address = %Self::normalize_address(address),
                "pending frame queue full, discarding oldest frame"
            );
            station.frames.remove(0);
        }
        station.frames.push(frame);
        Ok(())
    }

    /// Atomically swaps the station's pending-frame queue for an empty
    /// one and returns the previous contents in arrival order. A frame
    /// appended concurrently lands either fully in this drain or fully
    /// in the next, never split and never twice.
    pub async fn drain_frames(&self, address: &str) -> Result<Vec<Frame>, RegistryError> {
        let station = self.station(address).await?;
        let mut station = station.lock().await;
        Ok(std::mem::take(&mut station.frames))
    }

    /// Overwrites the station's last-reported battery level.
    pub async fn set_battery_level(&self, address: &str, level: u8) -> Result<(), RegistryError> {
        let station = self.station(address).await?;
        let mut station = station.lock().await;
        station.battery_level = Some(level);
        Ok(())
    }

    pub async fn contains(&self, address: &str) -> bool {
        let address = Self::normalize_address(address);
        self.stations.read().await.contains_key(&address)
    }

    /// Read-only, point-in-time snapshots of every station, sorted by
    /// address for stable status output. Snapshots are copies; nothing
    /// here can be mutated outside the registry's locks.
    pub async fn list(&self) -> Vec<StationSnapshot> {
        let stations: Vec<(String, Arc<Mutex<Station>>)> = {
            let map = self.stations.read().await;
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut snapshots = Vec::with_capacity(stations.len());
        for (address, station) in stations {
            let station = station.lock().await;
            snapshots.push(StationSnapshot {
                address,
                min_frequency: station.min_frequency,
                max_frequency: station.max_frequency,
                battery_level: station.battery_level,
                schedule: station.schedule.clone(),
            });
        }
        snapshots.sort_by(|a, b| a.address.cmp(&b.address));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: u64) -> ObservationRequest {
        ObservationRequest {
            start_time_millis: start,
            end_time_millis: start + 1000,
            current_time_millis: None,
            freq: 437_200_000.0,
            bw: 125_000.0,
            sf: 9,
            cr: 5,
            sync_word: 18,
            power: 10,
            preamble_length: 8,
            gain: 0,
            ldro: 0,
        }
    }

    fn frame(tag: u8) -> Frame {
        Frame {
            frequency_error: -1200,
            rssi: -101,
            snr: 5.25,
            timestamp_millis: u64::from(tag),
            data: vec![tag],
        }
    }

    #[tokio::test]
    async fn registration_is_idempotent() {
        let registry = StationRegistry::new();
        registry.register("AA:BB:CC:DD:EE:FF", 25_000_000, 1_700_000_000).await;
        registry
            .append_frame("aa:bb:cc:dd:ee:ff", frame(1))
            .await
            .unwrap();

        // Re-registration must not reset the frame backlog.
        registry.register("aa:bb:cc:dd:ee:ff", 25_000_000, 1_700_000_000).await;
        let frames = registry.drain_frames("AA:BB:CC:DD:EE:FF").await.unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn unknown_station_is_an_error() {
        let registry = StationRegistry::new();
        let err = registry.set_schedule("aa:bb", vec![]).await.unwrap_err();
        assert_eq!(err, RegistryError::UnknownStation("aa:bb".into()));
        assert!(registry.drain_frames("aa:bb").await.is_err());
        assert!(registry.append_frame("aa:bb", frame(0)).await.is_err());
        assert!(registry.set_battery_level("aa:bb", 50).await.is_err());
        assert!(registry.next_observation("aa:bb", 0).await.is_err());
    }

    #[tokio::test]
    async fn schedule_is_stored_sorted() {
        let registry = StationRegistry::new();
        registry.register("aa:bb", 0, 0).await;
        registry
            .set_schedule("aa:bb", vec![request(3000), request(1000), request(2000)])
            .await
            .unwrap();

        let snapshot = registry.list().await.remove(0);
        let starts: Vec<u64> = snapshot
            .schedule
            .iter()
            .map(|r| r.start_time_millis)
            .collect();
        assert_eq!(starts, vec![1000, 2000, 3000]);
    }

    #[tokio::test]
    async fn drain_returns_fifo_then_empty() {
        let registry = StationRegistry::new();
        registry.register("aa:bb", 0, 0).await;
        registry.append_frame("aa:bb", frame(1)).await.unwrap();
        registry.append_frame("aa:bb", frame(2)).await.unwrap();

        let frames = registry.drain_frames("aa:bb").await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, vec![1]);
        assert_eq!(frames[1].data, vec![2]);

        assert!(registry.drain_frames("aa:bb").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_queue_discards_oldest() {
        let registry = StationRegistry::new();
        registry.register("aa:bb", 0, 0).await;
        for _ in 0..MAX_PENDING_FRAMES {
            registry.append_frame("aa:bb", frame(1)).await.unwrap();
        }
        registry.append_frame("aa:bb", frame(2)).await.unwrap();

        let frames = registry.drain_frames("aa:bb").await.unwrap();
        assert_eq!(frames.len(), MAX_PENDING_FRAMES);
        assert_eq!(frames.last().unwrap().data, vec![2]);
    }

    #[tokio::test]
    async fn battery_level_overwrites_in_place() {
        let registry = StationRegistry::new();
        registry.register("aa:bb", 0, 0).await;
        registry.set_battery_level("aa:bb", 90).await.unwrap();
        registry.set_battery_level("aa:bb", 41).await.unwrap();
        assert_eq!(registry.list().await[0].battery_level, Some(41));
    }
}
