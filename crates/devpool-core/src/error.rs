//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Store error: {message}")]
    Store { message: String },

    // ─────────────────────────────────────────────────────────────
    // External Tool / Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Required tool not found in PATH: {tool}")]
    ToolNotFound { tool: String },

    #[error("External process error: {message}")]
    Process { message: String },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    // ─────────────────────────────────────────────────────────────
    // Automation Server Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Automation server error: {message}")]
    Automation { message: String },

    #[error("No free automation port in range [{min}, {max})")]
    PortsExhausted { min: u16, max: u16 },

    // ─────────────────────────────────────────────────────────────
    // Reservation Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid reservation: {message}")]
    Validation { message: String },

    #[error("Failed to unlock device {device_id} while rolling back a partial reservation")]
    CompensationFailed { device_id: String },

    // ─────────────────────────────────────────────────────────────
    // Device Bootstrap Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Device {device_id} failed to initialize: {reason}")]
    DeviceInit { device_id: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn device_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "device",
            id: id.into(),
        }
    }

    pub fn reservation_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "reservation",
            id: id.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn automation(message: impl Into<String>) -> Self {
        Self::Automation {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn device_init(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceInit {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Check if this error is transient: a reconciler loop should log it,
    /// sleep its backoff interval, and retry on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Store { .. }
                | Error::Process { .. }
                | Error::Timeout { .. }
                | Error::Automation { .. }
        )
    }

    /// Check if this error should stop the owning service entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ToolNotFound { .. }
                | Error::CompensationFailed { .. }
                | Error::Config { .. }
                | Error::ConfigNotFound { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::device_not_found("emulator-5554");
        assert_eq!(err.to_string(), "device not found: emulator-5554");

        let err = Error::PortsExhausted {
            min: 4774,
            max: 4974,
        };
        assert!(err.to_string().contains("[4774, 4974)"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_transient() {
        assert!(Error::store("connection refused").is_transient());
        assert!(Error::process("adb timed out").is_transient());
        assert!(Error::timeout("adb devices").is_transient());
        assert!(!Error::device_not_found("x").is_transient());
        assert!(!Error::validation("empty request").is_transient());
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::ToolNotFound {
            tool: "adb".to_string()
        }
        .is_fatal());
        assert!(Error::CompensationFailed {
            device_id: "111".to_string()
        }
        .is_fatal());
        assert!(Error::config("xcode path unset").is_fatal());
        assert!(!Error::store("flaky").is_fatal());
    }

    #[test]
    fn test_compensation_failed_is_not_transient() {
        let err = Error::CompensationFailed {
            device_id: "222".to_string(),
        };
        assert!(!err.is_transient());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_error_constructors() {
        let _ = Error::store("test");
        let _ = Error::process("test");
        let _ = Error::automation("test");
        let _ = Error::validation("test");
        let _ = Error::config("test");
        let _ = Error::device_init("id", "locked");
    }
}
