//! Reservation queue domain types

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceProperty, DeviceType, ReservedDevice};
use crate::error::{Error, Result};

/// Length of the opaque reservation token
const RESERVATION_ID_LEN: usize = 24;

/// One requested device inside a reservation.
///
/// Exactly one matching strategy applies, by precedence:
/// `device_id` > `device_type` > `device_name` > `properties`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "is_unspecified")]
    pub device_type: DeviceType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Requested properties; values may contain `*` / `?` wildcards
    #[serde(default)]
    pub properties: Vec<DeviceProperty>,
}

fn is_unspecified(device_type: &DeviceType) -> bool {
    *device_type == DeviceType::Unspecified
}

impl RequestedDevice {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            device_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_type(device_type: DeviceType) -> Self {
        Self {
            device_type,
            ..Default::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn by_properties(properties: Vec<DeviceProperty>) -> Self {
        Self {
            properties,
            ..Default::default()
        }
    }
}

/// A queued reservation awaiting allocation.
///
/// Lives in the reservation store until either matched (converted to a
/// [`ReservationApplied`], then deleted) or explicitly deleted by the caller.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,

    pub date_created: DateTime<Utc>,

    pub requested_devices: Vec<RequestedDevice>,

    /// Internal reconciliation flag, never exposed to callers
    #[serde(skip)]
    pub available: bool,

    /// How many passes failed to lock a device for this reservation
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_to_apply: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Reservation {
    pub fn new(requested_devices: Vec<RequestedDevice>) -> Self {
        Self {
            id: generate_reservation_id(),
            date_created: Utc::now(),
            requested_devices,
            available: false,
            failed_to_apply: 0,
        }
    }

    /// Intake validation: the request must name at least one device, and no
    /// two entries may pin the same `device_id`.
    pub fn validate(&self) -> Result<()> {
        if self.requested_devices.is_empty() {
            return Err(Error::validation(
                "reservation must request at least one device",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for requested in &self.requested_devices {
            if let Some(id) = &requested.device_id {
                if !seen.insert(id.as_str()) {
                    return Err(Error::validation(format!(
                        "duplicate requested device id: {id}"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// The committed result of successfully allocating every device of a
/// queued reservation. Deleting it unlocks every contained device.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationApplied {
    /// Copied from the source reservation
    pub id: String,

    pub date_created: DateTime<Utc>,

    pub reserved_devices: Vec<ReservedDevice>,

    #[serde(skip)]
    pub available: bool,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_to_apply: u32,
}

impl ReservationApplied {
    pub fn new(reservation: &Reservation, reserved_devices: Vec<ReservedDevice>) -> Self {
        Self {
            id: reservation.id.clone(),
            date_created: reservation.date_created,
            reserved_devices,
            available: true,
            failed_to_apply: reservation.failed_to_apply,
        }
    }
}

/// Generate a 24-character opaque reservation token
fn generate_reservation_id() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..RESERVATION_ID_LEN)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
