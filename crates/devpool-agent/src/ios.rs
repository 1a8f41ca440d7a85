//! iOS device enumeration and bootstrap via libimobiledevice
//!
//! Enumeration runs `idevice_id` / `ideviceinfo`. Before an iOS device
//! can serve automation traffic its developer disk image must be
//! mounted, so freshly ingested devices go through [`IosDiskImageMounter`]
//! first. A missing image for one iOS version fails that device only; a
//! missing image root is a configuration error that stops the daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use devpool_core::device::{Device, DeviceProperty};
use devpool_core::prelude::*;

use crate::exec::run_tool;
use crate::source::EnumerationSource;

const DISK_IMAGE_FILENAME: &str = "DeveloperDiskImage.dmg";

/// libimobiledevice-backed enumeration source
#[derive(Debug, Clone)]
pub struct IosEnumeration {
    tool_timeout: Duration,
}

impl IosEnumeration {
    pub fn new(tool_timeout: Duration) -> Self {
        Self { tool_timeout }
    }
}

impl EnumerationSource for IosEnumeration {
    async fn list_connected_device_ids(&self) -> Result<Vec<String>> {
        let output = run_tool("idevice_id", &["-l"], self.tool_timeout).await?;

        // idevice_id exits non-zero when no device is attached
        if !output.success {
            return Ok(Vec::new());
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    async fn read_device_name(&self, device_id: &str) -> Result<Option<String>> {
        let output = run_tool(
            "ideviceinfo",
            &["-u", device_id, "-k", "DeviceName"],
            self.tool_timeout,
        )
        .await?;

        if !output.success {
            return Ok(None);
        }

        let name = output.stdout.trim();
        Ok(if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        })
    }

    async fn read_properties(&self, device_id: &str) -> Result<Vec<DeviceProperty>> {
        let output = run_tool("ideviceinfo", &["-u", device_id], self.tool_timeout)
            .await?
            .require_success("ideviceinfo")?;

        Ok(parse_ideviceinfo(&output))
    }
}

/// Parse `ideviceinfo` output into device properties.
///
/// Top-level entries are `Key: Value`; indented lines belong to nested
/// plist values and are skipped.
fn parse_ideviceinfo(output: &str) -> Vec<DeviceProperty> {
    output
        .lines()
        .filter(|line| !line.starts_with(' ') && !line.starts_with('\t'))
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some(DeviceProperty {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Result of a successful bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    AlreadyMounted,
}

/// Per-device bootstrap performed between ingestion and going online
#[trait_variant::make(DeviceBootstrap: Send)]
pub trait LocalDeviceBootstrap {
    /// Prepare a freshly discovered device for automation use.
    ///
    /// A [`Error::DeviceInit`] failure is scoped to this device; any
    /// other error is treated by the caller per its classification.
    async fn initialize(&self, device: &Device) -> Result<MountOutcome>;
}

/// Mounts the matching developer disk image on a device
#[derive(Debug, Clone)]
pub struct IosDiskImageMounter {
    image_root: PathBuf,
    tool_timeout: Duration,
}

impl IosDiskImageMounter {
    /// The image root must exist; without it no iOS device can ever come
    /// online, so a missing directory is fatal.
    pub fn new(image_root: PathBuf, tool_timeout: Duration) -> Result<Self> {
        if !image_root.is_dir() {
            return Err(Error::config(format!(
                "developer image root {} does not exist",
                image_root.display()
            )));
        }
        Ok(Self {
            image_root,
            tool_timeout,
        })
    }

    async fn is_image_mounted(&self, device_id: &str) -> Result<bool> {
        let output = run_tool(
            "ideviceimagemounter",
            &["-u", device_id, "-l"],
            self.tool_timeout,
        )
        .await?
        .require_success("ideviceimagemounter -l")?;

        // A mounted image reports its signature in the lookup listing
        Ok(output.contains("ImageSignature["))
    }

    async fn mount(&self, device_id: &str, image: &Path) -> Result<()> {
        let signature = image.with_extension("dmg.signature");
        let output = run_tool(
            "ideviceimagemounter",
            &[
                "-u",
                device_id,
                &image.to_string_lossy(),
                &signature.to_string_lossy(),
            ],
            self.tool_timeout,
        )
        .await?;

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        if combined.contains("mount_image returned -3") {
            return Err(Error::device_init(
                device_id,
                "device is locked, unlock the screen and reconnect",
            ));
        }
        if !output.success || combined.contains("Error:") {
            return Err(Error::device_init(
                device_id,
                format!("ideviceimagemounter failed: {}", combined.trim()),
            ));
        }
        Ok(())
    }
}

impl DeviceBootstrap for IosDiskImageMounter {
    async fn initialize(&self, device: &Device) -> Result<MountOutcome> {
        let version = device
            .property("ProductVersion")
            .ok_or_else(|| Error::device_init(&device.id, "device reported no ProductVersion"))?;

        if self.is_image_mounted(&device.id).await? {
            debug!("Developer image already mounted on {}", device.id);
            return Ok(MountOutcome::AlreadyMounted);
        }

        let image = find_developer_image(&self.image_root, &version).ok_or_else(|| {
            Error::device_init(
                &device.id,
                format!("no developer disk image for iOS {version}"),
            )
        })?;

        info!(
            "Mounting developer image {} on {}",
            image.display(),
            device.id
        );
        self.mount(&device.id, &image).await?;
        Ok(MountOutcome::Mounted)
    }
}

/// Locate the disk image for an iOS version.
///
/// Images live at `<root>/<major.minor>/DeveloperDiskImage.dmg`; the
/// patch component of the device version is ignored.
fn find_developer_image(root: &Path, product_version: &str) -> Option<PathBuf> {
    let image = root
        .join(major_minor(product_version))
        .join(DISK_IMAGE_FILENAME);
    image.is_file().then_some(image)
}

fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    // the Local* variants stay out of scope so trait method calls stay
    // unambiguous
    use super::{
        find_developer_image, major_minor, parse_ideviceinfo, DeviceBootstrap,
        IosDiskImageMounter, DISK_IMAGE_FILENAME,
    };
    use std::path::PathBuf;
    use std::time::Duration;

    use devpool_core::device::{Device, DeviceStatus, DeviceType};
    use devpool_core::error::Error;

    #[test]
    fn test_parse_ideviceinfo() {
        let output = "DeviceName: Test iPhone\n\
                      ProductType: iPhone12,1\n\
                      ProductVersion: 16.4.1\n\
                      NonVolatileRAM:\n\
                      \x20 auto-boot: true\n\
                      MalformedLineWithoutColon\n";

        let props = parse_ideviceinfo(output);
        assert_eq!(props.len(), 4);
        assert_eq!(props[0].key, "DeviceName");
        assert_eq!(props[0].value, "Test iPhone");
        assert_eq!(props[2].key, "ProductVersion");
        assert_eq!(props[2].value, "16.4.1");
        // the nested key header keeps an empty value, the nested entry is dropped
        assert_eq!(props[3].key, "NonVolatileRAM");
        assert_eq!(props[3].value, "");
    }

    #[test]
    fn test_major_minor() {
        assert_eq!(major_minor("16.4.1"), "16.4");
        assert_eq!(major_minor("17.0"), "17.0");
        assert_eq!(major_minor("15"), "15");
    }

    #[test]
    fn test_find_developer_image() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("16.4");
        std::fs::create_dir(&version_dir).unwrap();
        std::fs::write(version_dir.join(DISK_IMAGE_FILENAME), b"dmg").unwrap();

        assert_eq!(
            find_developer_image(dir.path(), "16.4.1"),
            Some(version_dir.join(DISK_IMAGE_FILENAME))
        );
        assert_eq!(find_developer_image(dir.path(), "17.0"), None);
    }

    #[test]
    fn test_mounter_requires_existing_root() {
        let result = IosDiskImageMounter::new(
            PathBuf::from("/nonexistent/devimages"),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_initialize_requires_product_version() {
        let dir = tempfile::tempdir().unwrap();
        let mounter =
            IosDiskImageMounter::new(dir.path().to_path_buf(), Duration::from_secs(5)).unwrap();

        let device = Device::new(
            "udid-1",
            "Test iPhone",
            false,
            DeviceType::Ios,
            DeviceStatus::Initialize,
        );
        let err = mounter.initialize(&device).await.unwrap_err();
        assert!(matches!(err, Error::DeviceInit { .. }));
        assert!(!err.is_fatal());
    }
}
