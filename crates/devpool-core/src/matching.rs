//! Device matching for reservation requests
//!
//! Maps a [`RequestedDevice`] to a candidate [`Device`] from a snapshot of
//! the pool. Matching strategies apply in precedence order — first
//! applicable wins:
//!
//! 1. `device_id` — direct lookup; returns whatever the pool holds,
//!    available or not (eligibility is checked later, not here)
//! 2. `device_type` — filter by platform, pick uniformly at random
//! 3. `device_name` — exact name match, pick uniformly at random
//! 4. `properties` — every requested property must be satisfied, with
//!    glob-style wildcards (`*` / `?`) in values; pick uniformly at random

use rand::seq::SliceRandom;
use regex::Regex;

use crate::device::{Device, DeviceType};
use crate::reservation::RequestedDevice;

/// Find a device in the pool snapshot matching the request.
///
/// Returns `None` when the applicable strategy yields no candidate.
pub fn find_matching_device(requested: &RequestedDevice, pool: &[Device]) -> Option<Device> {
    if let Some(id) = &requested.device_id {
        return pool.iter().find(|d| &d.id == id).cloned();
    }

    if requested.device_type != DeviceType::Unspecified {
        let matching: Vec<&Device> = pool
            .iter()
            .filter(|d| d.device_type == requested.device_type)
            .collect();
        return select_random_device(&matching);
    }

    if let Some(name) = requested.device_name.as_deref().filter(|n| !n.is_empty()) {
        let matching: Vec<&Device> = pool.iter().filter(|d| d.name == name).collect();
        return select_random_device(&matching);
    }

    if !requested.properties.is_empty() {
        let matching: Vec<&Device> = pool
            .iter()
            .filter(|d| matches_all_properties(d, requested))
            .collect();
        return select_random_device(&matching);
    }

    None
}

/// A device matches iff every requested property is satisfied by some
/// device property with the same key.
fn matches_all_properties(device: &Device, requested: &RequestedDevice) -> bool {
    requested.properties.iter().all(|wanted| {
        device
            .properties
            .iter()
            .any(|prop| prop.key == wanted.key && value_matches(&prop.value, &wanted.value))
    })
}

fn value_matches(actual: &str, wanted: &str) -> bool {
    if wanted.contains('*') || wanted.contains('?') {
        match wildcard_to_regex(wanted) {
            Some(re) => re.is_match(actual),
            None => false,
        }
    } else {
        actual == wanted
    }
}

/// Compile a glob-style pattern (`*` → `.*`, `?` → `.`) to an anchored regex
fn wildcard_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern)
        .replace("\\*", ".*")
        .replace("\\?", ".");
    Regex::new(&format!("^{escaped}$")).ok()
}

/// Uniform random pick, no weighting
fn select_random_device(devices: &[&Device]) -> Option<Device> {
    devices
        .choose(&mut rand::thread_rng())
        .map(|d| (*d).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceProperty, DeviceStatus};

    fn device(id: &str, name: &str, device_type: DeviceType) -> Device {
        Device::new(id, name, true, device_type, DeviceStatus::Online)
    }

    fn pool() -> Vec<Device> {
        vec![
            device("111", "iPhone 11 Pro", DeviceType::Ios).with_properties(vec![
                DeviceProperty::new("DeviceName", "iPhone 11 Pro"),
                DeviceProperty::new("ProductVersion", "16.4"),
            ]),
            device("222", "Pixel 8", DeviceType::Android).with_properties(vec![
                DeviceProperty::new("ro.product.model", "Pixel 8"),
                DeviceProperty::new("ro.build.version.release", "14"),
            ]),
            device("333", "iPad Pro", DeviceType::Ios)
                .with_properties(vec![DeviceProperty::new("DeviceName", "iPad Pro")]),
        ]
    }

    #[test]
    fn test_match_by_id() {
        let requested = RequestedDevice::by_id("222");
        let found = find_matching_device(&requested, &pool()).unwrap();
        assert_eq!(found.id, "222");
    }

    #[test]
    fn test_match_by_id_returns_unavailable_devices() {
        let mut devices = pool();
        devices[1].available = false;
        devices[1].status = DeviceStatus::Locked;

        let requested = RequestedDevice::by_id("222");
        let found = find_matching_device(&requested, &devices).unwrap();
        assert_eq!(found.id, "222");
        assert!(!found.available);
    }

    #[test]
    fn test_id_takes_precedence_over_type() {
        // device 222 is Android; requesting id 222 with type iOS must
        // resolve by id only, ignoring the type
        let requested = RequestedDevice {
            device_id: Some("222".to_string()),
            device_type: DeviceType::Ios,
            ..Default::default()
        };

        let found = find_matching_device(&requested, &pool()).unwrap();
        assert_eq!(found.id, "222");
        assert_eq!(found.device_type, DeviceType::Android);
    }

    #[test]
    fn test_match_by_type() {
        let requested = RequestedDevice::by_type(DeviceType::Ios);
        for _ in 0..20 {
            let found = find_matching_device(&requested, &pool()).unwrap();
            assert_eq!(found.device_type, DeviceType::Ios);
        }
    }

    #[test]
    fn test_match_by_name_is_exact() {
        let requested = RequestedDevice::by_name("Pixel 8");
        let found = find_matching_device(&requested, &pool()).unwrap();
        assert_eq!(found.id, "222");

        let requested = RequestedDevice::by_name("Pixel");
        assert!(find_matching_device(&requested, &pool()).is_none());
    }

    #[test]
    fn test_match_by_exact_property() {
        let requested = RequestedDevice::by_properties(vec![DeviceProperty::new(
            "ro.build.version.release",
            "14",
        )]);
        let found = find_matching_device(&requested, &pool()).unwrap();
        assert_eq!(found.id, "222");
    }

    #[test]
    fn test_match_by_wildcard_property() {
        let requested =
            RequestedDevice::by_properties(vec![DeviceProperty::new("DeviceName", "iPhone*")]);

        for _ in 0..20 {
            let found = find_matching_device(&requested, &pool()).unwrap();
            // matches "iPhone 11 Pro" but never "iPad Pro"
            assert_eq!(found.id, "111");
        }
    }

    #[test]
    fn test_question_mark_wildcard() {
        let requested =
            RequestedDevice::by_properties(vec![DeviceProperty::new("ProductVersion", "16.?")]);
        let found = find_matching_device(&requested, &pool()).unwrap();
        assert_eq!(found.id, "111");

        let requested =
            RequestedDevice::by_properties(vec![DeviceProperty::new("ProductVersion", "17.?")]);
        assert!(find_matching_device(&requested, &pool()).is_none());
    }

    #[test]
    fn test_all_requested_properties_must_match() {
        let requested = RequestedDevice::by_properties(vec![
            DeviceProperty::new("DeviceName", "iPhone*"),
            DeviceProperty::new("ProductVersion", "17.*"),
        ]);
        assert!(find_matching_device(&requested, &pool()).is_none());

        let requested = RequestedDevice::by_properties(vec![
            DeviceProperty::new("DeviceName", "iPhone*"),
            DeviceProperty::new("ProductVersion", "16.*"),
        ]);
        assert!(find_matching_device(&requested, &pool()).is_some());
    }

    #[test]
    fn test_wildcard_escapes_regex_metacharacters() {
        let devices = vec![device("444", "Weird", DeviceType::Android)
            .with_properties(vec![DeviceProperty::new("tag", "a.b+c")])];

        // the dot and plus must be treated literally
        let requested = RequestedDevice::by_properties(vec![DeviceProperty::new("tag", "a.b+*")]);
        assert!(find_matching_device(&requested, &devices).is_some());

        let requested = RequestedDevice::by_properties(vec![DeviceProperty::new("tag", "aXb+*")]);
        assert!(find_matching_device(&requested, &devices).is_none());
    }

    #[test]
    fn test_empty_request_matches_nothing() {
        let requested = RequestedDevice::default();
        assert!(find_matching_device(&requested, &pool()).is_none());
    }

    #[test]
    fn test_unknown_id_returns_none() {
        let requested = RequestedDevice::by_id("999");
        assert!(find_matching_device(&requested, &pool()).is_none());
    }
}
