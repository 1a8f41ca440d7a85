//! # devpool-agent - External Tool Plumbing
//!
//! Everything that touches a real phone or spawns a real process lives
//! here: `adb` and libimobiledevice enumeration, developer disk image
//! mounting, and the per-device automation server lifecycle.
//!
//! The engine crate consumes this crate exclusively through its traits
//! ([`EnumerationSource`], [`DeviceBootstrap`], [`AutomationService`]),
//! so every tool interaction can be faked in tests.
//!
//! ## Modules
//!
//! - [`exec`] - Timeout-bounded tool invocation and server spawning
//! - [`tools`] - Startup PATH probing for required external tools
//! - [`source`] - The platform enumeration contract
//! - [`android`] - `adb`-backed enumeration
//! - [`ios`] - libimobiledevice enumeration and disk image bootstrap
//! - [`automation`] - Automation server registry and port allocation

pub mod android;
pub mod automation;
pub mod exec;
pub mod ios;
pub mod source;
pub mod tools;

pub use android::AndroidEnumeration;
pub use automation::{AutomationService, ProcessAutomationService};
pub use ios::{DeviceBootstrap, IosDiskImageMounter, IosEnumeration, MountOutcome};
pub use source::EnumerationSource;
pub use tools::ToolAvailability;
