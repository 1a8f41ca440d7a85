//! Tool availability checking
//!
//! Probes PATH once at startup for the external tools each platform
//! service depends on: `adb` (Android), the libimobiledevice suite (iOS),
//! and the configured automation server command.

use std::path::PathBuf;

use devpool_core::prelude::*;

/// Cached availability of external tools
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Path to `adb` if found
    pub adb: Option<PathBuf>,

    /// Path to `idevice_id` if found
    pub idevice_id: Option<PathBuf>,

    /// Path to `ideviceinfo` if found
    pub ideviceinfo: Option<PathBuf>,

    /// Path to `ideviceimagemounter` if found
    pub ideviceimagemounter: Option<PathBuf>,

    /// Path to the automation server command if found
    pub automation_server: Option<PathBuf>,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub fn check(automation_server_command: &str) -> Self {
        Self {
            adb: which::which("adb").ok(),
            idevice_id: which::which("idevice_id").ok(),
            ideviceinfo: which::which("ideviceinfo").ok(),
            ideviceimagemounter: which::which("ideviceimagemounter").ok(),
            automation_server: which::which(automation_server_command).ok(),
        }
    }

    /// Fail unless the Android toolchain is usable
    pub fn require_android(&self) -> Result<()> {
        if self.adb.is_none() {
            return Err(Error::ToolNotFound {
                tool: "adb".to_string(),
            });
        }
        Ok(())
    }

    /// Fail unless the iOS toolchain is usable
    pub fn require_ios(&self) -> Result<()> {
        for (tool, path) in [
            ("idevice_id", &self.idevice_id),
            ("ideviceinfo", &self.ideviceinfo),
            ("ideviceimagemounter", &self.ideviceimagemounter),
        ] {
            if path.is_none() {
                return Err(Error::ToolNotFound {
                    tool: tool.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fail unless the automation server command resolves
    pub fn require_automation_server(&self, command: &str) -> Result<()> {
        if self.automation_server.is_none() {
            return Err(Error::ToolNotFound {
                tool: command.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_nothing() {
        let availability = ToolAvailability::default();
        assert!(availability.require_android().is_err());
        assert!(availability.require_ios().is_err());
        assert!(availability.require_automation_server("appium").is_err());
    }

    #[test]
    fn test_require_android_names_missing_tool() {
        let availability = ToolAvailability::default();
        let err = availability.require_android().unwrap_err();
        assert!(err.to_string().contains("adb"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_require_ios_reports_first_missing_tool() {
        let availability = ToolAvailability {
            idevice_id: Some(PathBuf::from("/usr/bin/idevice_id")),
            ..Default::default()
        };
        let err = availability.require_ios().unwrap_err();
        assert!(err.to_string().contains("ideviceinfo"));
    }

    #[test]
    fn test_check_probes_path() {
        // `sh` exists on any unix test environment
        let availability = ToolAvailability::check("sh");
        assert!(availability.automation_server.is_some());
    }
}
