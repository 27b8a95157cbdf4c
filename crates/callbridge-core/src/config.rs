//! Bridge configuration
//!
//! All timings and presentation settings used by the coordinator. The
//! configuration can be built in code with the `with_*` methods or loaded
//! from TOML; any field missing from the file keeps its default.
//!
//! ```rust
//! use callbridge_core::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_toml_str(r#"
//!     device_debounce_ms = 1000
//!
//!     [notification]
//!     title = "Ongoing call"
//! "#).unwrap();
//!
//! assert_eq!(config.device_debounce_ms, 1000);
//! assert_eq!(config.foreground_transition_delay_ms, 250);
//! assert_eq!(config.notification.title, "Ongoing call");
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CallBridgeError, CallBridgeResult};
use crate::events::CallStateEventFormat;

/// Quiet period after the last raw device event before routing is re-evaluated
pub const DEFAULT_DEVICE_DEBOUNCE_MS: u64 = 1500;

/// Delay before acting on a foreground/background transition
pub const DEFAULT_FOREGROUND_TRANSITION_DELAY_MS: u64 = 250;

/// Default capacity of the outward event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Foreground-service notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notification channel identifier
    pub channel_id: String,
    /// User-visible channel name
    pub channel_name: String,
    /// Identifier of the ongoing-call notification
    pub notification_id: i32,
    /// Notification title
    pub title: String,
    /// Prefix of the broadcast action strings wired to notification buttons
    pub action_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_id: "ongoing_call".to_string(),
            channel_name: "Ongoing call".to_string(),
            notification_id: 1001,
            title: "Call in progress".to_string(),
            action_prefix: "callbridge.action".to_string(),
        }
    }
}

/// Picture-in-picture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipConfig {
    pub aspect_width: u32,
    pub aspect_height: u32,
}

impl Default for PipConfig {
    fn default() -> Self {
        Self {
            aspect_width: 9,
            aspect_height: 16,
        }
    }
}

/// Main configuration for the call bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Device-change debounce window in milliseconds
    pub device_debounce_ms: u64,
    /// Foreground/background transition delay in milliseconds
    pub foreground_transition_delay_ms: u64,
    /// Delay before the call-state listener registers (0 = immediately)
    pub call_listener_init_delay_ms: u64,
    /// Capacity of the outward event channel
    pub event_channel_capacity: usize,
    /// Which generation of call-state labels to emit
    pub call_state_format: CallStateEventFormat,
    /// Foreground-service notification settings
    pub notification: NotificationConfig,
    /// Picture-in-picture settings
    pub pip: PipConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_debounce_ms: DEFAULT_DEVICE_DEBOUNCE_MS,
            foreground_transition_delay_ms: DEFAULT_FOREGROUND_TRANSITION_DELAY_MS,
            call_listener_init_delay_ms: 0,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            call_state_format: CallStateEventFormat::default(),
            notification: NotificationConfig::default(),
            pip: PipConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a TOML document
    pub fn from_toml_str(content: &str) -> CallBridgeResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> CallBridgeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Set the device-change debounce window
    pub fn with_device_debounce(mut self, window: Duration) -> Self {
        self.device_debounce_ms = window.as_millis() as u64;
        self
    }

    /// Set the foreground/background transition delay
    pub fn with_foreground_transition_delay(mut self, delay: Duration) -> Self {
        self.foreground_transition_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the call-state listener initialization delay
    pub fn with_call_listener_init_delay(mut self, delay: Duration) -> Self {
        self.call_listener_init_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the call-state label format
    pub fn with_call_state_format(mut self, format: CallStateEventFormat) -> Self {
        self.call_state_format = format;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Set the notification settings
    pub fn with_notification(mut self, notification: NotificationConfig) -> Self {
        self.notification = notification;
        self
    }

    pub fn device_debounce(&self) -> Duration {
        Duration::from_millis(self.device_debounce_ms)
    }

    pub fn foreground_transition_delay(&self) -> Duration {
        Duration::from_millis(self.foreground_transition_delay_ms)
    }

    pub fn call_listener_init_delay(&self) -> Duration {
        Duration::from_millis(self.call_listener_init_delay_ms)
    }

    /// Check the configuration for values the coordinator cannot work with
    pub fn validate(&self) -> CallBridgeResult<()> {
        if self.device_debounce_ms == 0 {
            return Err(CallBridgeError::config("device_debounce_ms must be greater than zero"));
        }
        if self.event_channel_capacity == 0 {
            return Err(CallBridgeError::config("event_channel_capacity must be greater than zero"));
        }
        if self.pip.aspect_width == 0 || self.pip.aspect_height == 0 {
            return Err(CallBridgeError::config("pip aspect ratio components must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.device_debounce(), Duration::from_millis(1500));
        assert_eq!(config.foreground_transition_delay(), Duration::from_millis(250));
        assert_eq!(config.call_listener_init_delay(), Duration::ZERO);
        assert_eq!(config.call_state_format, CallStateEventFormat::Normalized);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = BridgeConfig::new()
            .with_device_debounce(Duration::from_millis(500))
            .with_foreground_transition_delay(Duration::from_millis(100))
            .with_call_state_format(CallStateEventFormat::Legacy)
            .with_event_channel_capacity(16);

        assert_eq!(config.device_debounce_ms, 500);
        assert_eq!(config.foreground_transition_delay_ms, 100);
        assert_eq!(config.call_state_format, CallStateEventFormat::Legacy);
        assert_eq!(config.event_channel_capacity, 16);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = BridgeConfig::from_toml_str(
            r#"
            call_state_format = "legacy"

            [pip]
            aspect_width = 16
            aspect_height = 9
            "#,
        )
        .unwrap();

        assert_eq!(config.call_state_format, CallStateEventFormat::Legacy);
        assert_eq!(config.pip.aspect_width, 16);
        assert_eq!(config.device_debounce_ms, DEFAULT_DEVICE_DEBOUNCE_MS);
        assert_eq!(config.notification, NotificationConfig::default());
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let result = BridgeConfig::from_toml_str("device_debounce_ms = 0");
        assert!(matches!(result, Err(CallBridgeError::Configuration { .. })));

        let result = BridgeConfig::from_toml_str("[pip]\naspect_height = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let result = BridgeConfig::from_toml_str("device_debounce_ms = \"soon\"");
        assert!(matches!(result, Err(CallBridgeError::Toml(_))));
    }
}
