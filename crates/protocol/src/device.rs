//! Devices and per-protocol pairing state as reported by `scan`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A device discovered by the helper's `scan` operation.
///
/// The `id` is derived, not part of the wire format: the helper's
/// `main_identifier` when present, else the first entry of `identifiers`,
/// else the network address. It is stable across scans of the same device
/// and unique within one scan result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "DeviceRecord")]
pub struct Device {
    #[serde(skip_serializing)]
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub deep_sleep: bool,
    pub identifiers: Vec<String>,
    pub protocols: Vec<ProtocolDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
}

impl Device {
    /// Whether any protocol has stored credentials, i.e. the device is paired.
    pub fn is_paired(&self) -> bool {
        self.protocols.iter().any(|p| p.credentials_present)
    }

    /// Heuristic used by callers to prioritize Apple TVs over other
    /// AirPlay-capable devices in a scan result.
    pub fn is_apple_tv(&self) -> bool {
        if let Some(model) = &self.model {
            if model.starts_with("AppleTV") {
                return true;
            }
        }
        self.name.contains("Apple TV")
    }

    fn derive_id(
        main_identifier: Option<&str>,
        identifiers: &[String],
        address: &str,
    ) -> String {
        main_identifier
            .map(str::to_owned)
            .or_else(|| identifiers.first().cloned())
            .unwrap_or_else(|| address.to_owned())
    }
}

/// Raw wire shape of a device; `Device` adds the derived `id` on top.
#[derive(Deserialize)]
struct DeviceRecord {
    name: String,
    address: String,
    model: Option<String>,
    deep_sleep: bool,
    identifiers: Vec<String>,
    protocols: Vec<ProtocolDescriptor>,
    main_identifier: Option<String>,
    power_state: Option<PowerState>,
}

impl From<DeviceRecord> for Device {
    fn from(record: DeviceRecord) -> Self {
        let id = Device::derive_id(
            record.main_identifier.as_deref(),
            &record.identifiers,
            &record.address,
        );
        Device {
            id,
            name: record.name,
            address: record.address,
            model: record.model,
            deep_sleep: record.deep_sleep,
            identifiers: record.identifiers,
            protocols: record.protocols,
            main_identifier: record.main_identifier,
            power_state: record.power_state,
        }
    }
}

/// One protocol supported by a device. The protocol name is unique within
/// a device's protocol list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub port: u16,
    pub requires_password: bool,
    /// Pairing-state label reported by the helper (e.g. "Mandatory",
    /// "NotNeeded", "Disabled").
    pub pairing: String,
    pub credentials_present: bool,
    pub password_present: bool,
    pub enabled: bool,
}

/// Last known power state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Lenient parse of the free-form state descriptions the helper emits
    /// in session responses ("PowerState.On", "powered on", "1", ...).
    pub fn from_description(description: &str) -> Option<Self> {
        let normalized = description.trim().to_ascii_lowercase();
        const ON: &[&str] = &["on", "powerstate.on", "powered on", "1"];
        const OFF: &[&str] = &["off", "powerstate.off", "powered off", "0"];

        if ON.contains(&normalized.as_str()) || normalized.ends_with(".on") {
            Some(PowerState::On)
        } else if OFF.contains(&normalized.as_str()) || normalized.ends_with(".off") {
            Some(PowerState::Off)
        } else {
            None
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_json(main_identifier: Option<&str>, identifiers: &[&str]) -> String {
        let main = match main_identifier {
            Some(id) => format!("\"{id}\""),
            None => "null".to_string(),
        };
        let ids: Vec<String> = identifiers.iter().map(|id| format!("\"{id}\"")).collect();
        format!(
            r#"{{
                "name": "Living Room",
                "address": "10.0.0.12",
                "model": "AppleTVGen4K",
                "deep_sleep": false,
                "identifiers": [{}],
                "protocols": [],
                "main_identifier": {main},
                "power_state": "on"
            }}"#,
            ids.join(",")
        )
    }

    #[test]
    fn id_prefers_main_identifier() {
        let device: Device =
            serde_json::from_str(&device_json(Some("AA:BB"), &["CC:DD", "EE:FF"])).unwrap();
        assert_eq!(device.id, "AA:BB");
    }

    #[test]
    fn id_falls_back_to_first_identifier() {
        let device: Device =
            serde_json::from_str(&device_json(None, &["CC:DD", "EE:FF"])).unwrap();
        assert_eq!(device.id, "CC:DD");
    }

    #[test]
    fn id_falls_back_to_address() {
        let device: Device = serde_json::from_str(&device_json(None, &[])).unwrap();
        assert_eq!(device.id, "10.0.0.12");
    }

    #[test]
    fn id_is_not_serialized() {
        let device: Device = serde_json::from_str(&device_json(None, &[])).unwrap();
        let value = serde_json::to_value(&device).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["address"], "10.0.0.12");
    }

    #[test]
    fn apple_tv_detection() {
        let mut device: Device = serde_json::from_str(&device_json(None, &[])).unwrap();
        assert!(device.is_apple_tv());

        device.model = Some("HomePod".to_string());
        assert!(!device.is_apple_tv());

        device.name = "Bedroom Apple TV".to_string();
        assert!(device.is_apple_tv());
    }

    #[test]
    fn power_state_description_parsing() {
        assert_eq!(PowerState::from_description("on"), Some(PowerState::On));
        assert_eq!(
            PowerState::from_description("PowerState.Off"),
            Some(PowerState::Off)
        );
        assert_eq!(
            PowerState::from_description("  Powered On \n"),
            Some(PowerState::On)
        );
        assert_eq!(PowerState::from_description("0"), Some(PowerState::Off));
        assert_eq!(PowerState::from_description("standby"), None);
    }
}
