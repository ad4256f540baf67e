//! # LIFX LAN control library
//!
//! `lifx-lan-lib` lets callers address smart lights on the local network by
//! their human-assigned label. It keeps a directory of label to address
//! mappings, probes the network only when a mapping is missing or stale, and
//! fans commands out across many lights at once.
//!
//! The network itself is reached through the [`probe::NetworkProbe`] trait.
//! The crate ships [`probe::simulated::SimulatedProbe`], an in-memory fleet of
//! virtual lights, for demos and tests.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use lifx_lan_lib::directory::clock::SystemClock;
//! use lifx_lan_lib::directory::{DeviceDirectory, DirectoryConfig};
//! use lifx_lan_lib::dispatch::CommandDispatcher;
//! use lifx_lan_lib::probe::simulated::SimulatedProbe;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let probe = Arc::new(SimulatedProbe::from_path("fleet.yaml")?);
//!     let directory = Arc::new(DeviceDirectory::new(
//!         probe,
//!         Arc::new(SystemClock),
//!         DirectoryConfig::default(),
//!     ));
//!     let dispatcher = CommandDispatcher::new(directory);
//!
//!     let labels = vec!["Desk".to_string(), "Hall".to_string()];
//!     dispatcher.turn_off(&labels, Duration::from_millis(500)).await?;
//!     Ok(())
//! }
//! ```

// Label to address resolution backed by a TTL cache.
pub mod directory;

// Concurrent application of one operation to many labels.
pub mod dispatch;

pub mod error;

// Public color and light state shapes, and their conversion from the
// device-native representation.
pub mod light;

// The network capability everything else is built on.
pub mod probe;

pub use error::{Error, Result};
