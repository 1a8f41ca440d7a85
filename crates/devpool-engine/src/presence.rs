//! Presence reconciliation
//!
//! Compares the tracked pool against the set of physically enumerated
//! devices and updates status and availability:
//!
//! - absent + not locked        -> `Offline`, unavailable
//! - absent + `Locked`          -> `LockedOffline` (reservation kept)
//! - present + `Offline`        -> `Online`, available
//! - present + `LockedOffline`  -> `Locked`, unavailable

use std::collections::HashSet;

use devpool_core::device::{DeviceStatus, DeviceType};
use devpool_core::prelude::*;

use crate::store::DeviceStore;

/// Reconcile tracked devices of one platform against the connected set.
/// Running it twice on the same snapshot is a no-op.
pub async fn reconcile_presence<D>(
    devices: &D,
    device_type: DeviceType,
    connected_ids: &HashSet<String>,
) -> Result<()>
where
    D: DeviceStore + Sync,
{
    for mut device in devices.all().await? {
        if device.device_type != device_type {
            continue;
        }

        let present = connected_ids.contains(&device.id);
        let next = if present {
            match device.status {
                DeviceStatus::Offline => Some((DeviceStatus::Online, true)),
                DeviceStatus::LockedOffline => Some((DeviceStatus::Locked, false)),
                _ => None,
            }
        } else {
            match device.status {
                DeviceStatus::Locked => Some((DeviceStatus::LockedOffline, device.available)),
                DeviceStatus::LockedOffline => None,
                DeviceStatus::Offline if !device.available => None,
                _ => Some((DeviceStatus::Offline, false)),
            }
        };

        if let Some((status, available)) = next {
            info!(
                "Device {} presence change: {:?} -> {:?}",
                device.id, device.status, status
            );
            device.status = status;
            device.available = available;
            devices.update(device).await?;
        }
    }

    Ok(())
}
