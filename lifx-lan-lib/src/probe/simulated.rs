use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use crate::light::color::{Hsbk, DEFAULT_KELVIN};
use crate::light::state::Named;
use crate::probe::{DeviceAddress, DeviceInfo, NetworkProbe, ProbeError, RawLightState};

/// One virtual light, as written in a fleet file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedDevice {
    pub label: String,
    pub mac: String,
    pub ip: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub power: u16,
    #[serde(default = "default_color")]
    pub color: Hsbk,
    /// Offline devices neither answer enumerations nor commands.
    #[serde(default)]
    pub offline: bool,
    /// Extra time this device takes to answer a command, in milliseconds.
    #[serde(default)]
    pub response_delay_ms: u64,
}

fn default_color() -> Hsbk {
    Hsbk {
        hue: 0,
        saturation: 0,
        brightness: u16::MAX,
        kelvin: DEFAULT_KELVIN,
    }
}

impl SimulatedDevice {
    pub fn new(label: &str, mac: &str, ip: &str) -> Self {
        SimulatedDevice {
            label: label.to_string(),
            mac: mac.to_string(),
            ip: ip.to_string(),
            group: String::new(),
            location: String::new(),
            power: 0,
            color: default_color(),
            offline: false,
            response_delay_ms: 0,
        }
    }

    pub fn address(&self) -> DeviceAddress {
        DeviceAddress {
            mac: self.mac.clone(),
            ip: self.ip.clone(),
        }
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            label: self.label.clone(),
            address: self.address(),
            group: Named::new(&self.group),
            location: Named::new(&self.location),
        }
    }

    fn raw_state(&self) -> RawLightState {
        RawLightState {
            label: self.label.clone(),
            group: Named::new(&self.group),
            location: Named::new(&self.location),
            color: self.color,
            power: self.power,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Fleet {
    devices: Vec<SimulatedDevice>,
}

/// A command received by the simulated network, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeCall {
    GetState {
        address: DeviceAddress,
    },
    SetColor {
        address: DeviceAddress,
        color: Hsbk,
        duration: Duration,
    },
    TurnOn {
        address: DeviceAddress,
        color: Option<Hsbk>,
        duration: Duration,
    },
    TurnOff {
        address: DeviceAddress,
        duration: Duration,
    },
}

/// An in-memory network of virtual lights implementing [`NetworkProbe`].
///
/// State changes stick, so a light turned off reads back as off. Devices are
/// matched by MAC address; an address whose IP no longer matches is treated
/// as unreachable, the same as a real light that moved.
pub struct SimulatedProbe {
    devices: Mutex<Vec<SimulatedDevice>>,
    calls: Mutex<Vec<ProbeCall>>,
    latency: Duration,
    timeout: Option<Duration>,
    discoveries: AtomicUsize,
    discovery_broken: AtomicBool,
}

impl SimulatedProbe {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        SimulatedProbe {
            devices: Mutex::new(devices),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            timeout: None,
            discoveries: AtomicUsize::new(0),
            discovery_broken: AtomicBool::new(false),
        }
    }

    /// Loads a fleet from a YAML (`.yaml`/`.yml`) or JSON file with a
    /// top-level `devices` list.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fleet file {}", path.display()))?;
        let fleet: Fleet = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML fleet {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON fleet {}", path.display()))?,
        };
        info!(
            "Loaded {} simulated devices from {}",
            fleet.devices.len(),
            path.display()
        );
        Ok(Self::new(fleet.devices))
    }

    /// Adds a delay before every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Gives up on a device command after `limit`, answering
    /// [`ProbeError::Timeout`] the way a real light that never replies would.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Number of enumerations served so far.
    pub fn discovery_count(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    pub async fn calls(&self) -> Vec<ProbeCall> {
        self.calls.lock().await.clone()
    }

    pub async fn device(&self, label: &str) -> Option<SimulatedDevice> {
        self.devices
            .lock()
            .await
            .iter()
            .find(|device| device.label == label)
            .cloned()
    }

    pub async fn add_device(&self, device: SimulatedDevice) {
        self.devices.lock().await.push(device);
    }

    /// Applies `change` to every device carrying `label`. Returns whether any matched.
    pub async fn update_device<F>(&self, label: &str, mut change: F) -> bool
    where
        F: FnMut(&mut SimulatedDevice),
    {
        let mut devices = self.devices.lock().await;
        let mut matched = false;
        for device in devices.iter_mut().filter(|device| device.label == label) {
            change(device);
            matched = true;
        }
        matched
    }

    /// Makes every subsequent enumeration fail until called again with `false`.
    pub fn break_discovery(&self, broken: bool) {
        self.discovery_broken.store(broken, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }

    async fn response_delay(&self, address: &DeviceAddress) -> Duration {
        self.devices
            .lock()
            .await
            .iter()
            .find(|device| device.mac == address.mac)
            .map(|device| Duration::from_millis(device.response_delay_ms))
            .unwrap_or_default()
    }

    /// Runs one request/response exchange with the device at `address`,
    /// bounded by the configured timeout.
    async fn answer<T, F>(&self, address: &DeviceAddress, act: F) -> Result<T, ProbeError>
    where
        F: FnOnce(&mut SimulatedDevice) -> T,
    {
        let exchange = async {
            self.simulate_latency().await;
            let delay = self.response_delay(address).await;
            if !delay.is_zero() {
                sleep(delay).await;
            }
            self.with_device(address, act).await
        };
        match self.timeout {
            Some(limit) => timeout(limit, exchange).await.unwrap_or_else(|_| {
                Err(ProbeError::Timeout {
                    address: address.clone(),
                    timeout: limit,
                })
            }),
            None => exchange.await,
        }
    }

    async fn with_device<T, F>(&self, address: &DeviceAddress, act: F) -> Result<T, ProbeError>
    where
        F: FnOnce(&mut SimulatedDevice) -> T,
    {
        let mut devices = self.devices.lock().await;
        let reachable = |device: &&mut SimulatedDevice| {
            !device.offline && device.mac == address.mac && device.ip == address.ip
        };
        match devices.iter_mut().find(reachable) {
            Some(device) => Ok(act(device)),
            None => Err(ProbeError::Unreachable {
                address: address.clone(),
            }),
        }
    }

    async fn record(&self, call: ProbeCall) {
        debug!("Simulated probe received {:?}", call);
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl NetworkProbe for SimulatedProbe {
    async fn discover(&self) -> Result<Vec<DeviceInfo>, ProbeError> {
        self.simulate_latency().await;
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        if self.discovery_broken.load(Ordering::SeqCst) {
            return Err(ProbeError::Discovery(
                "broadcast socket unavailable".to_string(),
            ));
        }
        let devices = self.devices.lock().await;
        Ok(devices
            .iter()
            .filter(|device| !device.offline)
            .map(SimulatedDevice::info)
            .collect())
    }

    async fn get_state(&self, address: &DeviceAddress) -> Result<RawLightState, ProbeError> {
        self.record(ProbeCall::GetState {
            address: address.clone(),
        })
        .await;
        self.answer(address, |device| device.raw_state()).await
    }

    async fn set_color(
        &self,
        address: &DeviceAddress,
        color: Hsbk,
        duration: Duration,
    ) -> Result<(), ProbeError> {
        self.record(ProbeCall::SetColor {
            address: address.clone(),
            color,
            duration,
        })
        .await;
        self.answer(address, |device| device.color = color).await
    }

    async fn turn_on(
        &self,
        address: &DeviceAddress,
        color: Option<Hsbk>,
        duration: Duration,
    ) -> Result<(), ProbeError> {
        self.record(ProbeCall::TurnOn {
            address: address.clone(),
            color,
            duration,
        })
        .await;
        self.answer(address, |device| {
            if let Some(color) = color {
                device.color = color;
            }
            device.power = 1;
        })
        .await
    }

    async fn turn_off(
        &self,
        address: &DeviceAddress,
        duration: Duration,
    ) -> Result<(), ProbeError> {
        self.record(ProbeCall::TurnOff {
            address: address.clone(),
            duration,
        })
        .await;
        self.answer(address, |device| device.power = 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loads_yaml_fleet_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "devices:\n  - label: Desk\n    mac: d0:73:d5:00:00:01\n    \
             ip: 192.168.1.20\n    group: Office"
        )
        .unwrap();

        let probe = SimulatedProbe::from_path(file.path()).unwrap();
        let devices = probe.devices.try_lock().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].group, "Office");
        assert_eq!(devices[0].location, "");
        assert_eq!(devices[0].color.kelvin, DEFAULT_KELVIN);
        assert!(!devices[0].offline);
    }

    #[test]
    fn test_loads_json_fleet() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"devices":[{{"label":"Hall","mac":"d0:73:d5:00:00:02","#
        )
        .unwrap();
        write!(file, r#""ip":"192.168.1.21","power":1}}]}}"#).unwrap();

        let probe = SimulatedProbe::from_path(file.path()).unwrap();
        let devices = probe.devices.try_lock().unwrap();
        assert_eq!(devices[0].label, "Hall");
        assert_eq!(devices[0].power, 1);
    }

    #[test]
    fn test_missing_fleet_file_reports_path() {
        let error = SimulatedProbe::from_path("/nonexistent/fleet.yaml")
            .err()
            .unwrap();
        assert!(error.to_string().contains("/nonexistent/fleet.yaml"));
    }

    #[tokio::test]
    async fn test_offline_devices_are_not_enumerated() {
        let mut offline = SimulatedDevice::new("Porch", "d0:73:d5:00:00:03", "192.168.1.22");
        offline.offline = true;
        let probe = SimulatedProbe::new(vec![
            SimulatedDevice::new("Desk", "d0:73:d5:00:00:01", "192.168.1.20"),
            offline,
        ]);

        let found = probe.discover().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "Desk");
        assert_eq!(probe.discovery_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_address_is_unreachable() {
        let desk = SimulatedDevice::new("Desk", "d0:73:d5:00:00:01", "192.168.1.20");
        let old_address = desk.address();
        let probe = SimulatedProbe::new(vec![desk]);
        probe
            .update_device("Desk", |device| device.ip = "192.168.1.99".to_string())
            .await;

        let result = probe.turn_off(&old_address, Duration::ZERO).await;
        assert_eq!(
            result,
            Err(ProbeError::Unreachable {
                address: old_address
            })
        );
    }

    #[tokio::test]
    async fn test_slow_device_times_out() {
        let mut desk = SimulatedDevice::new("Desk", "d0:73:d5:00:00:01", "192.168.1.20");
        desk.response_delay_ms = 500;
        let address = desk.address();
        let probe = SimulatedProbe::new(vec![desk]).with_timeout(Duration::from_millis(20));

        let result = probe.turn_on(&address, None, Duration::ZERO).await;
        assert_eq!(
            result,
            Err(ProbeError::Timeout {
                address,
                timeout: Duration::from_millis(20),
            })
        );
        assert_eq!(probe.device("Desk").await.unwrap().power, 0);
    }

    #[tokio::test]
    async fn test_fast_device_answers_within_timeout() {
        let desk = SimulatedDevice::new("Desk", "d0:73:d5:00:00:01", "192.168.1.20");
        let address = desk.address();
        let probe = SimulatedProbe::new(vec![desk]).with_timeout(Duration::from_secs(5));

        probe.turn_on(&address, None, Duration::ZERO).await.unwrap();
        assert_eq!(probe.device("Desk").await.unwrap().power, 1);
    }

    #[tokio::test]
    async fn test_broken_discovery_fails() {
        let probe = SimulatedProbe::new(Vec::new());
        probe.break_discovery(true);
        assert!(matches!(
            probe.discover().await,
            Err(ProbeError::Discovery(_))
        ));
    }
}
