use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::light::color::Color;
use crate::light::state::{Light, LightState};
use crate::probe::{DeviceAddress, DeviceInfo, NetworkProbe};

pub mod clock;

use clock::Clock;

/// How long a probed address is trusted without probing again.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub ttl: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig { ttl: DEFAULT_TTL }
    }
}

/// The cached address of one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub label: String,
    pub address: DeviceAddress,
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Fresh while younger than `ttl`. A `last_seen` in the future counts as age zero.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = (now - self.last_seen).to_std().unwrap_or_default();
        age < ttl
    }
}

/// Resolves labels to devices, probing the network only when the cached
/// address is missing or older than the configured TTL.
///
/// A probe always refreshes every device it sees, not just the label that
/// caused it. The cache lock is never held across a probe, so two concurrent
/// resolves of a stale label both probe and the later write wins.
pub struct DeviceDirectory {
    probe: Arc<dyn NetworkProbe>,
    clock: Arc<dyn Clock>,
    config: DirectoryConfig,
    cache: Mutex<HashMap<String, DeviceRecord>>,
    probes: AtomicUsize,
}

impl DeviceDirectory {
    pub fn new(
        probe: Arc<dyn NetworkProbe>,
        clock: Arc<dyn Clock>,
        config: DirectoryConfig,
    ) -> Self {
        DeviceDirectory {
            probe,
            clock,
            config,
            cache: Mutex::new(HashMap::new()),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> DirectoryConfig {
        self.config
    }

    /// Number of full enumerations started by this directory.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// The cache entry for `label`, fresh or not. Never touches the network.
    pub async fn cached(&self, label: &str) -> Option<DeviceRecord> {
        self.cache.lock().await.get(label).cloned()
    }

    pub async fn resolve(&self, label: &str) -> Result<DeviceHandle> {
        if label.is_empty() {
            return Err(Error::validation("label must not be empty"));
        }

        if let Some(address) = self.fresh_address(label).await {
            debug!("Resolved '{}' to {} from cache", label, address);
            return Ok(self.handle(label, address));
        }

        debug!("No fresh address for '{}', probing the network", label);
        let discovered = self.refresh().await.map_err(|e| e.for_label(label))?;
        // Same winner as the cache when labels collide: the last one observed.
        match discovered.into_iter().rev().find(|info| info.label == label) {
            Some(info) => Ok(self.handle(label, info.address)),
            None => Err(Error::NotFound {
                label: label.to_string(),
            }),
        }
    }

    /// Probes the network unconditionally and lists every light found.
    pub async fn list_all(&self) -> Result<Vec<Light>> {
        let discovered = self.refresh().await?;
        Ok(discovered.iter().map(Light::from).collect())
    }

    async fn fresh_address(&self, label: &str) -> Option<DeviceAddress> {
        let now = self.clock.now();
        let cache = self.cache.lock().await;
        cache
            .get(label)
            .filter(|record| record.is_fresh(now, self.config.ttl))
            .map(|record| record.address.clone())
    }

    async fn refresh(&self) -> Result<Vec<DeviceInfo>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let discovered = self.probe.discover().await?;
        let now = self.clock.now();

        let mut cache = self.cache.lock().await;
        let mut seen = HashSet::new();
        for info in &discovered {
            let record = DeviceRecord {
                label: info.label.clone(),
                address: info.address.clone(),
                last_seen: now,
            };
            if let Some(previous) = cache.insert(info.label.clone(), record) {
                if seen.contains(&info.label) && previous.address != info.address {
                    warn!(
                        "Label '{}' is shared by {} and {}; keeping the latter",
                        info.label, previous.address, info.address
                    );
                }
            }
            seen.insert(info.label.clone());
        }
        info!("Probe found {} devices", discovered.len());
        Ok(discovered)
    }

    fn handle(&self, label: &str, address: DeviceAddress) -> DeviceHandle {
        DeviceHandle {
            label: label.to_string(),
            address,
            probe: Arc::clone(&self.probe),
        }
    }
}

/// A resolved device, ready to be queried or commanded.
#[derive(Clone)]
pub struct DeviceHandle {
    label: String,
    address: DeviceAddress,
    probe: Arc<dyn NetworkProbe>,
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("label", &self.label)
            .field("address", &self.address)
            .finish()
    }
}

impl DeviceHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub async fn get_state(&self) -> Result<LightState> {
        let raw = self
            .probe
            .get_state(&self.address)
            .await
            .map_err(|source| self.failed(source))?;
        Ok(raw.into())
    }

    pub async fn set_color(&self, color: &Color, duration: Duration) -> Result<()> {
        self.probe
            .set_color(&self.address, color.to_hsbk(), duration)
            .await
            .map_err(|source| self.failed(source))
    }

    pub async fn turn_on(&self, color: Option<&Color>, duration: Duration) -> Result<()> {
        self.probe
            .turn_on(&self.address, color.map(Color::to_hsbk), duration)
            .await
            .map_err(|source| self.failed(source))
    }

    pub async fn turn_off(&self, duration: Duration) -> Result<()> {
        self.probe
            .turn_off(&self.address, duration)
            .await
            .map_err(|source| self.failed(source))
    }

    fn failed(&self, source: crate::probe::ProbeError) -> Error {
        Error::Device {
            label: self.label.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::clock::ManualClock;
    use crate::probe::simulated::{SimulatedDevice, SimulatedProbe};
    use crate::probe::ProbeError;

    struct Fixture {
        probe: Arc<SimulatedProbe>,
        clock: Arc<ManualClock>,
        directory: DeviceDirectory,
    }

    fn fixture() -> Fixture {
        let probe = Arc::new(SimulatedProbe::new(vec![
            SimulatedDevice::new("Desk", "d0:73:d5:00:00:01", "192.168.1.20"),
            SimulatedDevice::new("Hall", "d0:73:d5:00:00:02", "192.168.1.21"),
        ]));
        let clock = Arc::new(ManualClock::default());
        let directory = DeviceDirectory::new(
            probe.clone(),
            clock.clone(),
            DirectoryConfig::default(),
        );
        Fixture {
            probe,
            clock,
            directory,
        }
    }

    #[tokio::test]
    async fn test_resolve_within_ttl_probes_once() {
        let f = fixture();
        let first = f.directory.resolve("Desk").await.unwrap();
        f.clock.advance(Duration::from_secs(299));
        let second = f.directory.resolve("Desk").await.unwrap();

        assert_eq!(f.probe.discovery_count(), 1);
        assert_eq!(first.address(), second.address());
    }

    #[tokio::test]
    async fn test_resolve_after_ttl_probes_again() {
        let f = fixture();
        f.directory.resolve("Desk").await.unwrap();
        f.clock.advance(DEFAULT_TTL);
        f.directory.resolve("Desk").await.unwrap();

        assert_eq!(f.probe.discovery_count(), 2);
        assert_eq!(f.directory.probe_count(), 2);
    }

    #[tokio::test]
    async fn test_probe_refreshes_every_device() {
        let f = fixture();
        f.directory.resolve("Desk").await.unwrap();

        let hall = f.directory.cached("Hall").await.unwrap();
        assert_eq!(hall.address.ip, "192.168.1.21");
        assert_eq!(hall.last_seen, f.clock.now());

        f.directory.resolve("Hall").await.unwrap();
        assert_eq!(f.probe.discovery_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_label_is_not_found_after_probe() {
        let f = fixture();
        let error = f.directory.resolve("Garage").await.err().unwrap();

        assert!(matches!(error, Error::NotFound { ref label } if label == "Garage"));
        assert_eq!(
            error.to_string(),
            "No LIFX device found with label: Garage"
        );
        assert_eq!(f.probe.discovery_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_label_rejected_without_probe() {
        let f = fixture();
        assert!(matches!(
            f.directory.resolve("").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(f.probe.discovery_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_stale_resolves_do_not_serialize() {
        let latency = Duration::from_millis(200);
        let probe = Arc::new(
            SimulatedProbe::new(vec![SimulatedDevice::new(
                "Desk",
                "d0:73:d5:00:00:01",
                "192.168.1.20",
            )])
            .with_latency(latency),
        );
        let clock = Arc::new(ManualClock::default());
        let directory =
            DeviceDirectory::new(probe.clone(), clock.clone(), DirectoryConfig::default());
        directory.resolve("Desk").await.unwrap();
        clock.advance(Duration::from_secs(301));

        let started = std::time::Instant::now();
        let (first, second) =
            tokio::join!(directory.resolve("Desk"), directory.resolve("Desk"));
        let elapsed = started.elapsed();

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.address(), second.address());
        assert_eq!(probe.discovery_count(), 3);
        assert_eq!(directory.probe_count(), 3);
        assert!(
            elapsed < latency * 2,
            "resolves ran one after the other: {:?}",
            elapsed
        );

        let record = directory.cached("Desk").await.unwrap();
        assert_eq!(&record.address, first.address());
        assert_eq!(record.last_seen, clock.now());
    }

    #[tokio::test]
    async fn test_stale_entry_picks_up_new_address() {
        let f = fixture();
        f.directory.resolve("Desk").await.unwrap();
        f.probe
            .update_device("Desk", |device| device.ip = "192.168.1.40".to_string())
            .await;
        f.clock.advance(Duration::from_secs(301));

        let handle = f.directory.resolve("Desk").await.unwrap();
        assert_eq!(handle.address().ip, "192.168.1.40");
    }

    #[tokio::test]
    async fn test_list_all_bypasses_cache() {
        let f = fixture();
        f.directory.resolve("Desk").await.unwrap();
        f.probe
            .add_device(SimulatedDevice::new("Porch", "d0:73:d5:00:00:03", "192.168.1.22"))
            .await;

        let lights = f.directory.list_all().await.unwrap();
        let labels: Vec<&str> = lights.iter().map(|light| light.label.as_str()).collect();
        assert_eq!(labels, vec!["Desk", "Hall", "Porch"]);
        assert_eq!(f.probe.discovery_count(), 2);
        assert!(f.directory.cached("Porch").await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_label_last_observed_wins() {
        let f = fixture();
        f.probe
            .add_device(SimulatedDevice::new("Desk", "d0:73:d5:00:00:09", "192.168.1.29"))
            .await;

        let handle = f.directory.resolve("Desk").await.unwrap();
        assert_eq!(handle.address().mac, "d0:73:d5:00:00:09");
        let cached = f.directory.cached("Desk").await.unwrap();
        assert_eq!(cached.address.mac, "d0:73:d5:00:00:09");
    }

    #[tokio::test]
    async fn test_discovery_failure_names_label() {
        let f = fixture();
        f.probe.break_discovery(true);

        match f.directory.resolve("Desk").await {
            Err(Error::Device { label, source }) => {
                assert_eq!(label, "Desk");
                assert!(matches!(source, ProbeError::Discovery(_)));
            }
            other => panic!("expected device error, got {:?}", other.err()),
        }
        assert!(matches!(
            f.directory.list_all().await,
            Err(Error::Probe(ProbeError::Discovery(_)))
        ));
    }

    #[test]
    fn test_future_last_seen_counts_as_fresh() {
        let now = Utc::now();
        let record = DeviceRecord {
            label: "Desk".to_string(),
            address: DeviceAddress {
                mac: "d0:73:d5:00:00:01".to_string(),
                ip: "192.168.1.20".to_string(),
            },
            last_seen: now + chrono::Duration::seconds(30),
        };
        assert!(record.is_fresh(now, DEFAULT_TTL));
        assert!(!record.is_fresh(now + chrono::Duration::minutes(10), DEFAULT_TTL));
    }
}
