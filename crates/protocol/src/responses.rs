//! Response envelopes for the helper's one-shot operations.
//!
//! Every envelope is a flat object with a `status` field plus
//! operation-specific fields.

use serde::{Deserialize, Serialize};

use crate::device::Device;

/// Pairing status indicating the helper is waiting for a PIN on stdin.
pub const STATUS_PIN_REQUIRED: &str = "pin_required";
/// Pairing status indicating credentials were obtained.
pub const STATUS_PAIRED: &str = "paired";

/// Output of `scan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub devices: Vec<Device>,
}

/// Output of `pair`, both one-shot and each round of an interactive flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub protocol: String,
    #[serde(default)]
    pub credentials_saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PairResponse {
    pub fn pin_required(&self) -> bool {
        self.status == STATUS_PIN_REQUIRED
    }

    pub fn paired(&self) -> bool {
        self.status == STATUS_PAIRED
    }
}

/// Result of a remote-control command sent over a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub command: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock: Option<bool>,
}

/// Result of a power action sent over a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
}

/// Output of `unpair`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnpairResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub protocol: String,
    pub credentials_removed: bool,
}

/// Output of `clear-storage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearStorageResponse {
    pub status: String,
    pub cleared: bool,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_response_defaults_credentials_saved() {
        let response: PairResponse = serde_json::from_str(
            r#"{"status":"pin_required","protocol":"companion"}"#,
        )
        .unwrap();
        assert!(response.pin_required());
        assert!(!response.credentials_saved);
        assert!(response.credentials.is_none());
    }

    #[test]
    fn pair_response_full() {
        let response: PairResponse = serde_json::from_str(
            r#"{
                "status": "paired",
                "identifier": "AA:BB",
                "protocol": "airplay",
                "credentials_saved": true,
                "credentials": "deadbeef"
            }"#,
        )
        .unwrap();
        assert!(response.paired());
        assert!(response.credentials_saved);
        assert_eq!(response.credentials.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn scan_response_parses_devices() {
        let response: ScanResponse = serde_json::from_str(
            r#"{"devices":[{
                "name": "Office",
                "address": "10.0.0.9",
                "deep_sleep": true,
                "identifiers": ["11:22"],
                "protocols": [{
                    "protocol": "companion",
                    "port": 49153,
                    "requires_password": false,
                    "pairing": "Mandatory",
                    "credentials_present": true,
                    "password_present": false,
                    "enabled": true
                }]
            }]}"#,
        )
        .unwrap();
        let device = &response.devices[0];
        assert_eq!(device.id, "11:22");
        assert!(device.is_paired());
        assert_eq!(device.protocols[0].protocol, "companion");
    }
}
