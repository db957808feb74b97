//! Device types for registered hardware

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::str::FromStr;

use crate::address::DeviceAddress;
use crate::error::DeviceError;

/// Unique identifier for a device, derived from its address and type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Derive the identifier for an (address, type) pair
    ///
    /// The digest is SHA-1 over the canonical address immediately followed by
    /// the wire name of the type, hex encoded (40 characters). Registering the
    /// same pair twice always yields the same identifier.
    pub fn derive(address: &DeviceAddress, device_type: DeviceType) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(address.as_str().as_bytes());
        hasher.update(device_type.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an identifier received from a caller
    pub fn from_raw(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of device, as reported by the device's `/get_type` endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Relay board with individually switchable outlets
    PowerStrip,
    /// Infrared/RF remote controller
    RemoteController,
    /// RGB LED strip driver
    LedStripController,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [
        DeviceType::PowerStrip,
        DeviceType::RemoteController,
        DeviceType::LedStripController,
    ];

    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::PowerStrip => "power_strip",
            DeviceType::RemoteController => "remote_controller",
            DeviceType::LedStripController => "led_strip_controller",
        }
    }

    /// Sub-path under which the device exposes its commands
    pub fn command_path(&self) -> &'static str {
        match self {
            DeviceType::PowerStrip => "/ps",
            DeviceType::RemoteController => "/rc",
            DeviceType::LedStripController => "/rgb",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DeviceError::UnsupportedDevice(s.to_string()))
    }
}

/// A registered device
///
/// Address and type never change after creation; the identifier is a
/// function of both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Canonical base URL (`http://a.b.c.d[:port]`)
    pub address: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub command_path: String,
}

impl Device {
    /// Build the record for a freshly probed device
    pub fn new(address: &DeviceAddress, device_type: DeviceType) -> Self {
        Self {
            id: DeviceId::derive(address, device_type),
            address: address.as_str().to_string(),
            device_type,
            command_path: device_type.command_path().to_string(),
        }
    }
}

/// One switch row of a power strip profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchProfile {
    pub device_id: DeviceId,
    /// Label shared by every switch of the same power strip
    pub profile_name: String,
    /// 0-based position of the relay
    pub switch_index: i64,
    pub switch_name: String,
}

impl SwitchProfile {
    /// Profile name for the n-th candidate (`PS_1`, `PS_2`, ...)
    pub fn profile_name_candidate(n: u32) -> String {
        format!("PS_{}", n)
    }

    /// Default label for the relay at `index`
    pub fn default_switch_name(index: u32) -> String {
        format!("Switch {}", index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: &str) -> DeviceAddress {
        DeviceAddress::normalize(raw).unwrap()
    }

    #[test]
    fn test_device_id_is_deterministic() {
        let a = DeviceId::derive(&addr("192.168.1.10"), DeviceType::PowerStrip);
        let b = DeviceId::derive(&addr("http://192.168.1.10"), DeviceType::PowerStrip);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 40);
    }

    #[test]
    fn test_device_id_matches_sha1_of_concatenation() {
        let id = DeviceId::derive(&addr("192.168.1.10"), DeviceType::PowerStrip);
        let mut hasher = Sha1::new();
        hasher.update(b"http://192.168.1.10power_strip");
        assert_eq!(id.as_str(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_device_id_depends_on_type() {
        let a = DeviceId::derive(&addr("10.0.0.2"), DeviceType::PowerStrip);
        let b = DeviceId::derive(&addr("10.0.0.2"), DeviceType::RemoteController);
        assert_ne!(a, b);
    }

    #[test]
    fn test_device_type_wire_names() {
        assert_eq!("power_strip".parse::<DeviceType>().unwrap(), DeviceType::PowerStrip);
        assert_eq!(
            "led_strip_controller".parse::<DeviceType>().unwrap(),
            DeviceType::LedStripController
        );
        assert!(matches!(
            "toaster".parse::<DeviceType>(),
            Err(DeviceError::UnsupportedDevice(t)) if t == "toaster"
        ));
    }

    #[test]
    fn test_command_path_follows_type() {
        let device = Device::new(&addr("10.0.0.3"), DeviceType::LedStripController);
        assert_eq!(device.command_path, "/rgb");
        assert_eq!(device.address, "http://10.0.0.3");
        assert_eq!(DeviceType::RemoteController.command_path(), "/rc");
    }

    #[test]
    fn test_switch_default_names() {
        assert_eq!(SwitchProfile::profile_name_candidate(2), "PS_2");
        assert_eq!(SwitchProfile::default_switch_name(0), "Switch 0");
    }
}
