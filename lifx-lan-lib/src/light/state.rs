use serde::{Deserialize, Serialize};

use crate::light::color::Color;
use crate::probe::{DeviceInfo, RawLightState};

/// A group or location, identified by its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Named {
    pub label: String,
}

impl Named {
    pub fn new(label: impl Into<String>) -> Self {
        Named {
            label: label.into(),
        }
    }
}

/// Public attributes of a light, without its network address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Light {
    pub label: String,
    pub location: Named,
    pub group: Named,
}

impl From<&DeviceInfo> for Light {
    fn from(info: &DeviceInfo) -> Self {
        Light {
            label: info.label.clone(),
            location: info.location.clone(),
            group: info.group.clone(),
        }
    }
}

/// A live snapshot of one light. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightState {
    pub label: String,
    pub location: Named,
    pub group: Named,
    pub color: Color,
    pub is_on: bool,
}

/// Only a power flag of exactly `1` means the light is on.
pub fn is_powered(power: u16) -> bool {
    power == 1
}

impl From<RawLightState> for LightState {
    fn from(raw: RawLightState) -> Self {
        LightState {
            label: raw.label,
            location: raw.location,
            group: raw.group,
            color: raw.color.into(),
            is_on: is_powered(raw.power),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::color::Hsbk;
    use rstest::rstest;

    fn raw(power: u16) -> RawLightState {
        RawLightState {
            label: "Desk".to_string(),
            group: Named::new("Office"),
            location: Named::new("Home"),
            color: Hsbk {
                hue: 0,
                saturation: 0,
                brightness: u16::MAX,
                kelvin: 3200,
            },
            power,
        }
    }

    #[rstest]
    #[case(1, true)]
    #[case(0, false)]
    #[case(2, false)]
    #[case(u16::MAX, false)]
    fn test_power_mapping(#[case] power: u16, #[case] expected: bool) {
        assert_eq!(LightState::from(raw(power)).is_on, expected);
    }

    #[test]
    fn test_state_serializes_public_shape() {
        let state = LightState::from(raw(1));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isOn"], true);
        assert_eq!(json["group"]["label"], "Office");
        assert_eq!(json["location"]["label"], "Home");
        assert_eq!(json["color"]["brightness"], 1.0);
        assert_eq!(json["color"]["kelvin"], 3200);
    }
}
