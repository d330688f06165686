//! # LoRa Base Station Coordinator
//!
//! Coordinates a base station with battery-powered remote LoRa/FSK
//! observation units over a low-bandwidth wireless link: pushes each unit
//! a time-ordered observation schedule, collects the raw frames captured
//! during those windows, and tracks battery telemetry.
//!
//! ## Features
//!
//! - **Station registry**: per-station synchronized schedule, pending
//!   frames, and battery state
//! - **Wire codec**: fixed 40-byte observation records and 22-byte-header
//!   telemetry frames, big-endian, no padding
//! - **Scheduler**: pure "next observation" selection against a sorted
//!   schedule
//! - **Control API**: HTTP/JSON surface for registration, schedule
//!   upload, and data retrieval
//! - **Link bridge**: length-prefixed TCP endpoint for the wireless-stack
//!   daemon's read/write callbacks
//!
//! ## Quick Start
//!
//! ```rust
//! use lorabase::registry::StationRegistry;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = StationRegistry::new();
//!     registry.register("aa:bb:cc:dd:ee:ff", 25_000_000, 1_700_000_000).await;
//!     assert!(registry.contains("AA:BB:CC:DD:EE:FF").await);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`registry`] - station state and the only place mutation is synchronized
//! - [`scheduler`] - observation selection rule
//! - [`codec`] - binary wire encodings for the notification channel
//! - [`protocol`] - data model and JSON shapes
//! - [`link`] - wireless-stack callback entry points
//! - [`bridge`] - TCP transport for the link callbacks
//! - [`control`] - operator HTTP API
//! - [`config`] - persisted station configuration

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod codec;
pub mod config;
pub mod control;
pub mod link;
pub mod protocol;
pub mod registry;
pub mod scheduler;

// Re-export main public types for convenience
pub use codec::CodecError;
pub use protocol::{Frame, ObservationRequest, StationSnapshot};
pub use registry::{RegistryError, StationRegistry};
