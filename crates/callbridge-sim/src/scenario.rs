//! Scenario files
//!
//! A scenario describes the simulated handset (attached devices, API
//! generation, permissions), optional bridge configuration, and a list of
//! timed steps.
//!
//! ```toml
//! settle_ms = 2000
//!
//! [platform]
//! devices = [{ id = 1, raw_type = 1 }, { id = 2, raw_type = 2 }]
//!
//! [[steps]]
//! at_ms = 0
//! action = { type = "init_audio_devices" }
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use callbridge_core::audio::device::AudioEndpoint;
use callbridge_core::platform::mock::MockPlatform;
use callbridge_core::platform::{Permission, RawDeviceEvent};
use callbridge_core::{BridgeConfig, CallBridge, DeviceId, SessionAction};

/// How long to keep running after the last step by default
const DEFAULT_SETTLE_MS: u64 = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Time to wait after the last step before shutting down
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default)]
    pub config: Option<BridgeConfig>,
    #[serde(default)]
    pub platform: PlatformSetup,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeviceSpec {
    pub id: i32,
    pub raw_type: i32,
}

impl DeviceSpec {
    fn endpoint(&self) -> AudioEndpoint {
        AudioEndpoint::new(self.id, self.raw_type)
    }
}

/// Initial state of the simulated handset
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformSetup {
    pub communication_device_api: bool,
    pub telephony_callback_api: bool,
    pub devices: Vec<DeviceSpec>,
    /// Permission names (e.g. `READ_PHONE_STATE`) that are not granted
    pub revoked: Vec<String>,
}

impl Default for PlatformSetup {
    fn default() -> Self {
        Self {
            communication_device_api: true,
            telephony_callback_api: true,
            devices: Vec::new(),
            revoked: Vec::new(),
        }
    }
}

impl PlatformSetup {
    pub fn build(&self) -> Result<MockPlatform> {
        let platform = MockPlatform::new();
        platform.set_supports_communication_device(self.communication_device_api);
        platform.set_supports_telephony_callback(self.telephony_callback_api);
        platform.set_devices(self.devices.iter().map(DeviceSpec::endpoint).collect());
        for name in &self.revoked {
            platform.revoke(parse_permission(name)?);
        }
        Ok(platform)
    }
}

fn parse_permission(name: &str) -> Result<Permission> {
    match Permission::ALL.into_iter().find(|p| p.as_str() == name) {
        Some(permission) => Ok(permission),
        None => bail!("unknown permission '{}'", name),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Offset from scenario start
    pub at_ms: u64,
    pub action: Action,
}

/// Something the application layer, the user or the OS does
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    InitAudioDevices,
    HandleDevicesChange {
        #[serde(default)]
        device_id: Option<i32>,
    },
    Attach { id: i32, raw_type: i32 },
    Detach { id: i32 },
    HeadsetConnection { connected: bool },
    RequestAudioFocus,
    AbandonAudioFocus,
    AudioFocusChange { event_code: i32 },
    UpdateUiState {
        mic_on: bool,
        in_room: bool,
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        cam_muted: bool,
    },
    ActivatePip,
    StartForegroundListener,
    CheckPermissions,
    AppForeground,
    AppBackground,
    /// Raw telephony code (0 idle, 1 ringing, 2 offhook)
    CallState { code: i32 },
    NotificationAction { action: SessionAction },
    Shutdown,
}

impl Action {
    /// Apply the action to the bridge or the simulated platform
    pub fn apply(&self, bridge: &CallBridge, platform: &MockPlatform) {
        match self {
            Action::InitAudioDevices => bridge.init_audio_devices(),
            Action::HandleDevicesChange { device_id } => bridge.handle_devices_change(device_id.map(DeviceId)),
            Action::Attach { id, raw_type } => platform.attach(AudioEndpoint::new(*id, *raw_type)),
            Action::Detach { id } => platform.detach(DeviceId(*id)),
            Action::HeadsetConnection { connected } => {
                platform.emit_device_event(RawDeviceEvent::HeadsetConnectionChanged { connected: *connected })
            }
            Action::RequestAudioFocus => {
                bridge.request_audio_focus();
            }
            Action::AbandonAudioFocus => bridge.abandon_audio_focus(),
            Action::AudioFocusChange { event_code } => bridge.on_audio_focus_change(*event_code),
            Action::UpdateUiState {
                mic_on,
                in_room,
                room,
                cam_muted,
            } => bridge.update_ui_state(*mic_on, *in_room, room.clone(), *cam_muted),
            Action::ActivatePip => {
                bridge.activate_pip();
            }
            Action::StartForegroundListener => {
                bridge.start_foreground_listener();
            }
            Action::CheckPermissions => {
                bridge.check_permissions();
            }
            Action::AppForeground => bridge.on_app_foreground(),
            Action::AppBackground => bridge.on_app_background(),
            Action::CallState { code } => platform.emit_call_state(*code),
            Action::NotificationAction { action } => bridge.on_notification_action(*action),
            Action::Shutdown => bridge.shutdown(),
        }
    }
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut scenario: Scenario = toml::from_str(content).context("invalid scenario")?;
        scenario.steps.sort_by_key(|step| step.at_ms);
        Ok(scenario)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Offset of the last step
    pub fn duration_ms(&self) -> u64 {
        self.steps.last().map(|step| step.at_ms).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_toml_str(
            r#"
            name = "drop"

            [config]
            device_debounce_ms = 500

            [platform]
            communication_device_api = false
            devices = [{ id = 1, raw_type = 1 }]
            revoked = ["READ_PHONE_STATE"]

            [[steps]]
            at_ms = 300
            action = { type = "detach", id = 7 }

            [[steps]]
            at_ms = 0
            action = { type = "update_ui_state", mic_on = true, in_room = true, room = "Lobby" }

            [[steps]]
            at_ms = 900
            action = { type = "notification_action", action = "MUTE_MIC" }
            "#,
        )
        .unwrap();

        assert_eq!(scenario.name.as_deref(), Some("drop"));
        assert_eq!(scenario.settle_ms, DEFAULT_SETTLE_MS);
        assert_eq!(scenario.config.as_ref().unwrap().device_debounce_ms, 500);
        assert!(!scenario.platform.communication_device_api);
        assert_eq!(scenario.steps[0].at_ms, 0);
        assert!(matches!(scenario.steps[0].action, Action::UpdateUiState { mic_on: true, .. }));
        assert!(matches!(
            scenario.steps[2].action,
            Action::NotificationAction {
                action: SessionAction::MuteMic
            }
        ));
        assert_eq!(scenario.duration_ms(), 900);
    }

    #[test]
    fn test_unknown_permission_rejected() {
        let setup = PlatformSetup {
            revoked: vec!["TELEPATHY".to_string()],
            ..PlatformSetup::default()
        };
        assert!(setup.build().is_err());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result = Scenario::from_toml_str(
            r#"
            [[steps]]
            at_ms = 0
            action = { type = "reboot" }
            "#,
        );
        assert!(result.is_err());
    }
}
