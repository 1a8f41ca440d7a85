//! Platform enumeration contract
//!
//! One implementation per platform (`adb` for Android, libimobiledevice
//! for iOS). The ingestion and presence loops only see this trait.

use devpool_core::device::DeviceProperty;
use devpool_core::error::Result;

/// Physical device enumeration for one platform
#[trait_variant::make(EnumerationSource: Send)]
pub trait LocalEnumerationSource {
    /// Ids of the devices currently connected and usable
    async fn list_connected_device_ids(&self) -> Result<Vec<String>>;

    /// Human-readable device name; `None` when the device refuses to answer
    async fn read_device_name(&self, device_id: &str) -> Result<Option<String>>;

    /// Full property dump for a device
    async fn read_properties(&self, device_id: &str) -> Result<Vec<DeviceProperty>>;
}
