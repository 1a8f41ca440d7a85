//! Shared test helpers
//!
//! Available to unit tests and, behind the `test-helpers` feature, to
//! integration tests of downstream crates.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use devpool_agent::automation::AutomationService;
use devpool_agent::ios::{DeviceBootstrap, MountOutcome};
use devpool_agent::source::EnumerationSource;
use devpool_core::device::{Device, DeviceProperty, DeviceStatus, DeviceType};
use devpool_core::prelude::*;

/// A pool device that is online and free to reserve
pub fn online_device(id: &str, name: &str, device_type: DeviceType) -> Device {
    Device::new(id, name, true, device_type, DeviceStatus::Online)
}

/// A pool device currently held by a reservation
pub fn locked_device(id: &str, name: &str, device_type: DeviceType) -> Device {
    let mut device = Device::new(id, name, false, device_type, DeviceStatus::Locked);
    device.automation_endpoint = format!("http://127.0.0.1:4774/wd/hub#{id}");
    device
}

/// Scripted in-memory automation service
#[derive(Default)]
pub struct FakeAutomation {
    fail_start: Mutex<HashSet<String>>,
    fail_stop: Mutex<HashSet<String>>,
    running: Mutex<HashMap<String, String>>,
    next_port: Mutex<u16>,
}

impl FakeAutomation {
    pub fn new() -> Self {
        Self {
            next_port: Mutex::new(4774),
            ..Default::default()
        }
    }

    /// Make `start` fail for this device id
    pub fn fail_start_for(&self, device_id: &str) {
        self.fail_start
            .lock()
            .unwrap()
            .insert(device_id.to_string());
    }

    /// Make `stop` fail for this device id
    pub fn fail_stop_for(&self, device_id: &str) {
        self.fail_stop.lock().unwrap().insert(device_id.to_string());
    }

    pub fn is_running(&self, device_id: &str) -> bool {
        self.running.lock().unwrap().contains_key(device_id)
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap().len()
    }
}

impl AutomationService for FakeAutomation {
    async fn start(&self, device_id: &str) -> Result<String> {
        if self.fail_start.lock().unwrap().contains(device_id) {
            return Err(Error::automation(format!(
                "scripted start failure for {device_id}"
            )));
        }

        let port = {
            let mut next = self.next_port.lock().unwrap();
            let port = *next;
            *next += 1;
            port
        };
        let endpoint = format!("http://127.0.0.1:{port}/wd/hub");
        self.running
            .lock()
            .unwrap()
            .insert(device_id.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    async fn stop(&self, device_id: &str) -> Result<bool> {
        if self.fail_stop.lock().unwrap().contains(device_id) {
            return Err(Error::automation(format!(
                "scripted stop failure for {device_id}"
            )));
        }
        Ok(self.running.lock().unwrap().remove(device_id).is_some())
    }

    async fn shutdown_all(&self) {
        self.running.lock().unwrap().clear();
    }
}

/// Scripted enumeration source
#[derive(Default)]
pub struct FakeEnumeration {
    connected: Mutex<Vec<String>>,
    names: Mutex<HashMap<String, String>>,
    properties: Mutex<HashMap<String, Vec<DeviceProperty>>>,
}

impl FakeEnumeration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a connected device with a name and properties
    pub fn connect(&self, id: &str, name: &str, properties: Vec<DeviceProperty>) {
        self.connected.lock().unwrap().push(id.to_string());
        self.names
            .lock()
            .unwrap()
            .insert(id.to_string(), name.to_string());
        self.properties
            .lock()
            .unwrap()
            .insert(id.to_string(), properties);
    }

    /// Plug in a device that refuses to report a name
    pub fn connect_nameless(&self, id: &str) {
        self.connected.lock().unwrap().push(id.to_string());
    }

    /// Unplug a device
    pub fn disconnect(&self, id: &str) {
        self.connected.lock().unwrap().retain(|c| c != id);
    }
}

impl EnumerationSource for FakeEnumeration {
    async fn list_connected_device_ids(&self) -> Result<Vec<String>> {
        Ok(self.connected.lock().unwrap().clone())
    }

    async fn read_device_name(&self, device_id: &str) -> Result<Option<String>> {
        Ok(self.names.lock().unwrap().get(device_id).cloned())
    }

    async fn read_properties(&self, device_id: &str) -> Result<Vec<DeviceProperty>> {
        Ok(self
            .properties
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Scripted device bootstrap
#[derive(Default)]
pub struct FakeBootstrap {
    fail_for: Mutex<HashSet<String>>,
    initialized: Mutex<Vec<String>>,
}

impl FakeBootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `initialize` fail for this device id
    pub fn fail_for(&self, device_id: &str) {
        self.fail_for.lock().unwrap().insert(device_id.to_string());
    }

    pub fn initialized_ids(&self) -> Vec<String> {
        self.initialized.lock().unwrap().clone()
    }
}

impl DeviceBootstrap for FakeBootstrap {
    async fn initialize(&self, device: &Device) -> Result<MountOutcome> {
        if self.fail_for.lock().unwrap().contains(&device.id) {
            return Err(Error::device_init(&device.id, "scripted bootstrap failure"));
        }
        self.initialized.lock().unwrap().push(device.id.clone());
        Ok(MountOutcome::Mounted)
    }
}
