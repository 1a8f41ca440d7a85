//! Android device enumeration via `adb`
//!
//! Enumeration runs `adb devices`, keeps only devices in the `device`
//! state (unauthorized and offline entries are logged and dropped), and
//! reads names and properties over `adb shell`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use devpool_core::device::DeviceProperty;
use devpool_core::prelude::*;

use crate::exec::run_tool;
use crate::source::EnumerationSource;

/// `[ro.product.model]: [Pixel 8]`
static GETPROP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(.+?)\]:\s*\[(.*)\]$").expect("valid regex"));

/// `adb`-backed enumeration source
#[derive(Debug, Clone)]
pub struct AndroidEnumeration {
    tool_timeout: Duration,
}

impl AndroidEnumeration {
    pub fn new(tool_timeout: Duration) -> Self {
        Self { tool_timeout }
    }
}

impl EnumerationSource for AndroidEnumeration {
    async fn list_connected_device_ids(&self) -> Result<Vec<String>> {
        let output = run_tool("adb", &["devices"], self.tool_timeout)
            .await?
            .require_success("adb devices")?;

        let mut ids = Vec::new();
        for (id, state) in parse_adb_devices(&output) {
            if state == "device" {
                ids.push(id);
            } else {
                debug!("Skipping android device {} in state '{}'", id, state);
            }
        }
        Ok(ids)
    }

    async fn read_device_name(&self, device_id: &str) -> Result<Option<String>> {
        let name = run_tool(
            "adb",
            &["-s", device_id, "shell", "settings", "get", "global", "device_name"],
            self.tool_timeout,
        )
        .await?
        .require_success("adb shell settings")?;

        if let Some(name) = usable_device_name(&name) {
            return Ok(Some(name));
        }

        // Older images answer "null"; fall back to the hostname property
        let hostname = run_tool(
            "adb",
            &["-s", device_id, "shell", "getprop", "net.hostname"],
            self.tool_timeout,
        )
        .await?
        .require_success("adb shell getprop")?;

        Ok(usable_device_name(&hostname))
    }

    async fn read_properties(&self, device_id: &str) -> Result<Vec<DeviceProperty>> {
        let output = run_tool(
            "adb",
            &["-s", device_id, "shell", "getprop"],
            self.tool_timeout,
        )
        .await?
        .require_success("adb shell getprop")?;

        Ok(parse_getprop(&output))
    }
}

/// Parse `adb devices` output into `(id, state)` pairs.
///
/// The first line is the `List of devices attached` header; every
/// following non-empty line is `<id>\t<state>`.
fn parse_adb_devices(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let id = parts.next()?;
            let state = parts.next()?;
            Some((id.to_string(), state.to_string()))
        })
        .collect()
}

/// Parse `adb shell getprop` output into device properties.
///
/// Lines that do not match the `[key]: [value]` shape (wrapped values,
/// permission warnings) are skipped.
fn parse_getprop(output: &str) -> Vec<DeviceProperty> {
    output
        .lines()
        .filter_map(|line| {
            let captures = GETPROP_LINE.captures(line.trim())?;
            Some(DeviceProperty {
                key: captures[1].to_string(),
                value: captures[2].to_string(),
            })
        })
        .collect()
}

/// Normalize a shell answer into a usable device name.
///
/// `settings get` answers the literal string `null` on unset values, and
/// shell failures surface as `Error: ...` text on stdout.
fn usable_device_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name == "null" || name.contains("Error") {
        None
    } else {
        Some(name.to_string())
    }
}
