//! Device lock and unlock
//!
//! Locking and unlocking fail in opposite directions. A failed lock
//! unwinds completely so the device stays reservable. A failed server
//! stop during unlock persists nothing: the device is returned with
//! only the availability grant applied in memory, and the store keeps
//! status and endpoint for a later retry.

use devpool_agent::automation::AutomationService;
use devpool_core::device::{Device, DeviceStatus};
use devpool_core::prelude::*;

use crate::store::DeviceStore;

/// Lock a device: mark it unavailable, start its automation server, and
/// persist it as `Locked` with the server endpoint. When the server
/// fails to start the device is unwound via [`unlock_device`] and the
/// start error propagates.
pub async fn lock_device<D, A>(devices: &D, automation: &A, device_id: &str) -> Result<Device>
where
    D: DeviceStore + Sync,
    A: AutomationService + Sync,
{
    let mut device = devices
        .get(device_id)
        .await?
        .ok_or_else(|| Error::device_not_found(device_id))?;

    device.available = false;

    let endpoint = match automation.start(device_id).await {
        Ok(endpoint) => endpoint,
        Err(start_err) => {
            if let Err(unlock_err) = unlock_device(devices, automation, device_id).await {
                error!(
                    "Failed to unwind half-locked device {}: {}",
                    device_id, unlock_err
                );
            }
            return Err(start_err);
        }
    };

    device.status = DeviceStatus::Locked;
    device.automation_endpoint = endpoint;
    devices.update(device.clone()).await?;

    info!("Locked device {}", device_id);
    Ok(device)
}

/// Unlock a device: release availability, stop its automation server,
/// clear the endpoint, and persist the device as `Offline` (presence
/// reconciliation brings it back to `Online` on its next tick).
///
/// When no server was tracked for the device, or the server could not
/// be stopped, nothing is persisted and the returned device carries
/// only `available=true`; a non-`Offline` status tells the caller the
/// unlock did not fully complete. Unlocking a device that was never
/// locked is a benign no-op for the same reason.
pub async fn unlock_device<D, A>(devices: &D, automation: &A, device_id: &str) -> Result<Device>
where
    D: DeviceStore + Sync,
    A: AutomationService + Sync,
{
    let mut device = devices
        .get(device_id)
        .await?
        .ok_or_else(|| Error::device_not_found(device_id))?;

    device.available = true;

    match automation.stop(device_id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("No automation server was tracked for {}", device_id);
            return Ok(device);
        }
        Err(stop_err) => {
            warn!(
                "Automation server for {} could not be stopped, leaving device partially unlocked: {}",
                device_id, stop_err
            );
            return Ok(device);
        }
    }

    device.status = DeviceStatus::Offline;
    device.automation_endpoint.clear();
    devices.update(device.clone()).await?;

    info!("Unlocked device {}", device_id);
    Ok(device)
}
