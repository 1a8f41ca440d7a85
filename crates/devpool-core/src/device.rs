//! Device pool domain types

use serde::{Deserialize, Serialize};

/// Platform a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum DeviceType {
    #[default]
    Unspecified,
    Android,
    #[serde(rename = "iOS")]
    Ios,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Unspecified => write!(f, "unspecified"),
            DeviceType::Android => write!(f, "Android"),
            DeviceType::Ios => write!(f, "iOS"),
        }
    }
}

/// Lifecycle status of a pooled device.
///
/// `LockedOffline` means a reserved device dropped off the bus; the
/// reservation stays intact and the device returns to `Locked` when it
/// reappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Locked,
    LockedOffline,
    Initialize,
    FailedToInitialize,
}

impl DeviceStatus {
    /// True while the device is held by a reservation (physically present or not).
    pub fn is_locked(&self) -> bool {
        matches!(self, DeviceStatus::Locked | DeviceStatus::LockedOffline)
    }
}

/// A single key/value property read off a physical device
/// (`adb shell getprop` / `ideviceinfo` output).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceProperty {
    pub key: String,
    pub value: String,
}

impl DeviceProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A device known to the pool
///
/// Identity (`id`) is immutable once created. `properties` are replaced
/// wholesale on re-ingestion, never merged.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique device identifier (adb serial / iOS UDID)
    pub id: String,

    /// Human-readable device name
    pub name: String,

    /// Whether the device can be handed to a new reservation
    pub available: bool,

    #[serde(rename = "type")]
    pub device_type: DeviceType,

    pub status: DeviceStatus,

    /// URL of the running automation server, non-empty only while locked
    #[serde(default)]
    pub automation_endpoint: String,

    #[serde(default)]
    pub properties: Vec<DeviceProperty>,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        available: bool,
        device_type: DeviceType,
        status: DeviceStatus,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            available,
            device_type,
            status,
            automation_endpoint: String::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<DeviceProperty>) -> Self {
        self.properties = properties;
        self
    }

    /// Look up a property value by key
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Check the status/availability invariant: a locked device must never
    /// advertise itself as available.
    pub fn invariant_holds(&self) -> bool {
        !(self.status.is_locked() && self.available)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "id: [{}], name: [{}], type: [{}], status: [{:?}], available: [{}]",
            self.id, self.name, self.device_type, self.status, self.available
        )
    }
}

/// Snapshot of a locked device taken at lock time, stored inside an
/// applied reservation. Not a live reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedDevice {
    pub device_id: String,
    pub automation_endpoint: String,
}

impl ReservedDevice {
    pub fn from_device(device: &Device) -> Self {
        Self {
            device_id: device.id.clone(),
            automation_endpoint: device.automation_endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> Device {
        Device::new(
            "emulator-5554",
            "Pixel 8",
            true,
            DeviceType::Android,
            DeviceStatus::Online,
        )
    }

    #[test]
    fn test_device_serde_camel_case() {
        let device = sample_device();
        let json = serde_json::to_string(&device).unwrap();

        assert!(json.contains("\"automationEndpoint\""));
        assert!(json.contains("\"type\":\"Android\""));
        assert!(json.contains("\"status\":\"Online\""));
    }

    #[test]
    fn test_ios_type_rename() {
        let json = serde_json::to_string(&DeviceType::Ios).unwrap();
        assert_eq!(json, "\"iOS\"");

        let parsed: DeviceType = serde_json::from_str("\"iOS\"").unwrap();
        assert_eq!(parsed, DeviceType::Ios);
    }

    #[test]
    fn test_status_is_locked() {
        assert!(DeviceStatus::Locked.is_locked());
        assert!(DeviceStatus::LockedOffline.is_locked());
        assert!(!DeviceStatus::Online.is_locked());
        assert!(!DeviceStatus::Offline.is_locked());
    }

    #[test]
    fn test_property_lookup() {
        let device = sample_device().with_properties(vec![
            DeviceProperty::new("ro.product.model", "Pixel 8"),
            DeviceProperty::new("ro.build.version.release", "14"),
        ]);

        assert_eq!(device.property("ro.product.model"), Some("Pixel 8"));
        assert_eq!(device.property("ro.build.version.release"), Some("14"));
        assert_eq!(device.property("missing"), None);
    }

    #[test]
    fn test_invariant_locked_implies_unavailable() {
        let mut device = sample_device();
        device.status = DeviceStatus::Locked;
        device.available = true;
        assert!(!device.invariant_holds());

        device.available = false;
        assert!(device.invariant_holds());

        device.status = DeviceStatus::Online;
        device.available = true;
        assert!(device.invariant_holds());
    }

    #[test]
    fn test_reserved_device_snapshot() {
        let mut device = sample_device();
        device.automation_endpoint = "http://10.0.0.2:4774/wd/hub".to_string();

        let reserved = ReservedDevice::from_device(&device);
        assert_eq!(reserved.device_id, "emulator-5554");
        assert_eq!(reserved.automation_endpoint, "http://10.0.0.2:4774/wd/hub");

        // Mutating the source afterwards must not affect the snapshot
        device.automation_endpoint.clear();
        assert_eq!(reserved.automation_endpoint, "http://10.0.0.2:4774/wd/hub");
    }
}
