//! Automation server lifecycle
//!
//! One automation server process per locked device. Running servers are
//! tracked in an in-process registry keyed by device id; ports are
//! allocated from the configured range by skipping registry entries and
//! probing the remainder with a bind.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;

use devpool_core::config::AutomationSettings;
use devpool_core::prelude::*;

use crate::exec::spawn_server;

/// How long a freshly spawned server gets before its liveness check
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Starts and stops per-device automation servers
#[trait_variant::make(AutomationService: Send)]
pub trait LocalAutomationService {
    /// Start a server for a device and return its endpoint URL.
    async fn start(&self, device_id: &str) -> Result<String>;

    /// Stop the server for a device. `Ok(false)` means none was running;
    /// `Err` means a server exists but could not be brought down.
    async fn stop(&self, device_id: &str) -> Result<bool>;

    /// Stop every tracked server. Used at daemon shutdown.
    async fn shutdown_all(&self);
}

struct ServerProcess {
    child: Child,
    port: u16,
}

/// Spawns real server processes per [`AutomationSettings`]
pub struct ProcessAutomationService {
    settings: AutomationSettings,
    registry: Mutex<HashMap<String, ServerProcess>>,
}

impl ProcessAutomationService {
    pub fn new(settings: AutomationSettings) -> Self {
        Self {
            settings,
            registry: Mutex::new(HashMap::new()),
        }
    }
}

impl AutomationService for ProcessAutomationService {
    async fn start(&self, device_id: &str) -> Result<String> {
        let mut registry = self.registry.lock().await;

        // A leftover entry means a previous unlock never completed
        if let Some(mut stale) = registry.remove(device_id) {
            warn!("Killing stale automation server for {}", device_id);
            if let Err(e) = stale.child.kill().await {
                warn!("Failed to kill stale server for {}: {}", device_id, e);
            }
        }

        let used: HashSet<u16> = registry.values().map(|p| p.port).collect();
        let port = allocate_port(
            &self.settings.host,
            self.settings.port_min,
            self.settings.port_max,
            &used,
        )?;

        let log_file = self
            .settings
            .log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{device_id}.log")));

        let args = server_args(device_id, &self.settings.host, port);
        let mut child = spawn_server(&self.settings.server_command, &args, log_file.as_deref())?;

        // Catch servers that die straight away (bad install, bad flags)
        tokio::time::sleep(STARTUP_GRACE).await;
        if let Some(status) = child.try_wait()? {
            return Err(Error::automation(format!(
                "automation server for {device_id} exited immediately ({status})"
            )));
        }

        let endpoint = format!("http://{}:{}/wd/hub", self.settings.host, port);
        info!(
            "Automation server for {} listening on {}",
            device_id, endpoint
        );
        registry.insert(device_id.to_string(), ServerProcess { child, port });
        Ok(endpoint)
    }

    async fn stop(&self, device_id: &str) -> Result<bool> {
        let mut registry = self.registry.lock().await;
        let Some(mut process) = registry.remove(device_id) else {
            return Ok(false);
        };

        if let Err(e) = process.child.kill().await {
            // Put the entry back so a later stop can retry
            registry.insert(device_id.to_string(), process);
            return Err(Error::automation(format!(
                "failed to stop automation server for {device_id}: {e}"
            )));
        }

        info!("Stopped automation server for {}", device_id);
        Ok(true)
    }

    async fn shutdown_all(&self) {
        let mut registry = self.registry.lock().await;
        for (device_id, mut process) in registry.drain() {
            match process.child.kill().await {
                Ok(()) => info!("Stopped automation server for {}", device_id),
                Err(e) => warn!("Failed to stop server for {}: {}", device_id, e),
            }
        }
    }
}

/// Pick the first free port in `[min, max)`.
///
/// Ports held by the registry are skipped outright; the rest are probed
/// with a bind on the configured host, so ports taken by unrelated
/// processes are skipped too.
fn allocate_port(host: &str, min: u16, max: u16, used: &HashSet<u16>) -> Result<u16> {
    for port in min..max {
        if used.contains(&port) {
            continue;
        }
        if std::net::TcpListener::bind((host, port)).is_ok() {
            return Ok(port);
        }
    }
    Err(Error::PortsExhausted { min, max })
}

fn server_args(device_id: &str, host: &str, port: u16) -> Vec<String> {
    vec![
        "--address".to_string(),
        host.to_string(),
        "--port".to_string(),
        port.to_string(),
        "--base-path".to_string(),
        "/wd/hub".to_string(),
        "--session-override".to_string(),
        "--default-capabilities".to_string(),
        serde_json::json!({ "appium:udid": device_id }).to_string(),
    ]
}
