use std::fmt::{Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::light::color::Hsbk;
use crate::light::state::Named;

pub mod simulated;

/// Network endpoint of one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub mac: String,
    pub ip: String,
}

impl Display for DeviceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.ip, self.mac)
    }
}

/// One device as reported by an enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub label: String,
    pub address: DeviceAddress,
    pub group: Named,
    pub location: Named,
}

/// Light state in the device-native representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLightState {
    pub label: String,
    pub group: Named,
    pub location: Named,
    pub color: Hsbk,
    /// `1` when the light is powered.
    pub power: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("device discovery failed: {0}")]
    Discovery(String),
    #[error("device at {address} is unreachable")]
    Unreachable { address: DeviceAddress },
    #[error("device at {address} did not answer within {timeout:?}")]
    Timeout {
        address: DeviceAddress,
        timeout: Duration,
    },
}

/// The capability the directory and the dispatcher are built on: enumerate the
/// reachable devices, and read or change the state of one device by address.
///
/// Implementations carry their own timeouts. Nothing above this trait retries.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Enumerates every reachable device. May legitimately return an empty list.
    async fn discover(&self) -> Result<Vec<DeviceInfo>, ProbeError>;

    async fn get_state(&self, address: &DeviceAddress) -> Result<RawLightState, ProbeError>;

    async fn set_color(
        &self,
        address: &DeviceAddress,
        color: Hsbk,
        duration: Duration,
    ) -> Result<(), ProbeError>;

    /// Powers the light on, optionally switching to `color` in the same transition.
    async fn turn_on(
        &self,
        address: &DeviceAddress,
        color: Option<Hsbk>,
        duration: Duration,
    ) -> Result<(), ProbeError>;

    async fn turn_off(&self, address: &DeviceAddress, duration: Duration)
        -> Result<(), ProbeError>;
}
