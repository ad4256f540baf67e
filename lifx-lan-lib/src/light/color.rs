use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kelvin sent to a device when a request does not name one.
pub const DEFAULT_KELVIN: u16 = 3500;

/// Color temperatures accepted in requests.
pub const KELVIN_RANGE: RangeInclusive<u16> = 1500..=9000;

const CHANNEL_MAX: f64 = u16::MAX as f64;

/// A color as exchanged with callers.
///
/// `hue`, `saturation` and `brightness` are fractions in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub hue: f64,
    pub saturation: f64,
    pub brightness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kelvin: Option<u16>,
}

/// The device-native color: 16-bit hue, saturation and brightness channels
/// plus a color temperature in Kelvin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Color {
    pub fn new(hue: f64, saturation: f64, brightness: f64, kelvin: Option<u16>) -> Self {
        Color {
            hue,
            saturation,
            brightness,
            kelvin,
        }
    }

    /// Checks every channel against its documented range.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("hue", self.hue),
            ("saturation", self.saturation),
            ("brightness", self.brightness),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::validation(format!(
                    "color {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if let Some(kelvin) = self.kelvin {
            if !KELVIN_RANGE.contains(&kelvin) {
                return Err(Error::validation(format!(
                    "color kelvin must be within [{}, {}], got {}",
                    KELVIN_RANGE.start(),
                    KELVIN_RANGE.end(),
                    kelvin
                )));
            }
        }
        Ok(())
    }

    /// Converts to the device representation, filling in [`DEFAULT_KELVIN`].
    pub fn to_hsbk(&self) -> Hsbk {
        Hsbk {
            hue: fraction_to_channel(self.hue),
            saturation: fraction_to_channel(self.saturation),
            brightness: fraction_to_channel(self.brightness),
            kelvin: self.kelvin.unwrap_or(DEFAULT_KELVIN),
        }
    }
}

impl From<Hsbk> for Color {
    fn from(hsbk: Hsbk) -> Self {
        Color {
            hue: channel_to_fraction(hsbk.hue),
            saturation: channel_to_fraction(hsbk.saturation),
            brightness: channel_to_fraction(hsbk.brightness),
            kelvin: Some(hsbk.kelvin),
        }
    }
}

fn fraction_to_channel(value: f64) -> u16 {
    (value.clamp(0.0, 1.0) * CHANNEL_MAX).round() as u16
}

fn channel_to_fraction(value: u16) -> f64 {
    f64::from(value) / CHANNEL_MAX
}
