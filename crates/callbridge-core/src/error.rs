//! Error types for the call bridge
//!
//! Errors are produced by platform calls and by configuration loading. The
//! coordinator's public command surface never hands them to the application
//! layer: each entry point logs the error and reduces it to the bool/no-op
//! outcome of the command.

use thiserror::Error;

/// Result type for call bridge operations
pub type CallBridgeResult<T> = Result<T, CallBridgeError>;

/// Errors that can occur while talking to the OS or loading configuration
#[derive(Debug, Error)]
pub enum CallBridgeError {
    /// An OS service handle is missing (audio, telephony, notification manager)
    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    /// A required permission is not granted
    #[error("Permission denied: {permission}")]
    PermissionDenied { permission: String },

    /// Transient platform exception during an OS call
    #[error("Platform error in {operation}: {message}")]
    Platform { operation: String, message: String },

    /// Attempt to route to a device that is not attached
    #[error("Audio device not found: {device_id}")]
    DeviceNotFound { device_id: i32 },

    /// Call-state transition not permitted by the state machine
    #[error("Invalid call state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No async runtime available to schedule timers on
    #[error("Runtime error: {message}")]
    Runtime { message: String },

    /// Failed to read a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a TOML configuration
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CallBridgeError {
    /// Create a service unavailable error
    pub fn service_unavailable(service: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }

    /// Create a platform error
    pub fn platform(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Platform {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Whether the error means the feature should be silently disabled
    /// rather than reported
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Whether the error comes from a missing OS service
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CallBridgeError::platform("setCommunicationDevice", "dead object");
        assert_eq!(
            err.to_string(),
            "Platform error in setCommunicationDevice: dead object"
        );

        let err = CallBridgeError::DeviceNotFound { device_id: 42 };
        assert_eq!(err.to_string(), "Audio device not found: 42");
    }

    #[test]
    fn test_error_classification() {
        assert!(CallBridgeError::permission_denied("READ_PHONE_STATE").is_permission_denied());
        assert!(CallBridgeError::service_unavailable("audio").is_service_unavailable());
        assert!(!CallBridgeError::config("bad").is_permission_denied());
    }
}
