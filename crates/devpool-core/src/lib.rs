//! # devpool-core - Core Domain Types
//!
//! Foundation crate for the device pool manager. Provides the device and
//! reservation domain model, the device-matching algorithm, error handling,
//! configuration, and logging bootstrap.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, regex, rand, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`device`, `reservation`)
//! - [`Device`] - A pooled device with status, availability, and properties
//! - [`DeviceStatus`] - Lifecycle status (Online, Locked, LockedOffline, ...)
//! - [`DeviceType`] - Platform (Android / iOS)
//! - [`Reservation`] - A queued request for one or more devices
//! - [`ReservationApplied`] - The committed result of a matched reservation
//! - [`RequestedDevice`] - One requested device with its matching strategy
//!
//! ### Matching (`matching`)
//! - [`find_matching_device()`] - Resolve a request against a pool snapshot
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `transient` vs `fatal` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Configuration (`config`)
//! - [`Settings`] - TOML-backed daemon settings, injected at construction
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use devpool_core::prelude::*;
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod matching;
pub mod reservation;

/// Prelude for common imports used throughout all device pool crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use config::{
    AndroidSettings, AutomationSettings, IosSettings, ReservationSettings, Settings, ToolSettings,
};
pub use device::{Device, DeviceProperty, DeviceStatus, DeviceType, ReservedDevice};
pub use error::{Error, Result, ResultExt};
pub use matching::find_matching_device;
pub use reservation::{RequestedDevice, Reservation, ReservationApplied};
