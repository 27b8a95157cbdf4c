//! OS collaborators
//!
//! Every OS service the coordinator touches is reached through one of the
//! capability traits below. A host embeds the bridge by implementing them
//! over the real platform APIs; [`mock`] provides an in-memory
//! implementation for tests and simulation.
//!
//! Methods are synchronous: OS callbacks arrive on their own threads and
//! every call here is short. Calls that must run on the UI-owning thread
//! (notifications, window flags, PiP) are posted through
//! [`MainThreadDispatcher`] by the caller.

use std::fmt;
use std::sync::Arc;

use crate::audio::device::{AudioEndpoint, DeviceId};
use crate::error::CallBridgeResult;
use crate::session::notification::NotificationContent;
use crate::session::pip::{PipParams, Rect};

pub mod mock;

/// OS audio mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Normal,
    InCommunication,
}

/// Audio attribute usage of a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioUsage {
    VoiceCommunication,
}

/// Audio attribute content type of a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContentType {
    Speech,
}

/// Requested focus duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusGain {
    Gain,
}

/// Focus request submitted to the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusRequest {
    pub usage: AudioUsage,
    pub content_type: AudioContentType,
    pub gain: FocusGain,
}

impl FocusRequest {
    /// Request scoped to voice-communication speech
    pub fn voice_communication() -> Self {
        Self {
            usage: AudioUsage::VoiceCommunication,
            content_type: AudioContentType::Speech,
            gain: FocusGain::Gain,
        }
    }
}

/// Live OS focus-request handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FocusHandle(pub u64);

/// OS answer to a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusResult {
    Granted(FocusHandle),
    Delayed,
    Denied,
}

/// Bluetooth SCO link state reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoAudioState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Raw hardware notifications delivered by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDeviceEvent {
    DevicesAdded(Vec<AudioEndpoint>),
    DevicesRemoved(Vec<AudioEndpoint>),
    /// The OS reports a change of the active communication device
    CommunicationDeviceChanged(Option<DeviceId>),
    /// Bluetooth SCO sub-event
    ScoAudioStateChanged(ScoAudioState),
    /// Bluetooth SCO sub-event: adapter switched on or off
    BluetoothAdapterStateChanged { enabled: bool },
    /// Bluetooth SCO sub-event: headset profile connected or disconnected
    HeadsetConnectionChanged { connected: bool },
}

impl RawDeviceEvent {
    /// SCO sub-events bypass the debouncer and are handled immediately
    pub fn is_sco_sub_event(&self) -> bool {
        matches!(
            self,
            RawDeviceEvent::ScoAudioStateChanged(_)
                | RawDeviceEvent::BluetoothAdapterStateChanged { .. }
                | RawDeviceEvent::HeadsetConnectionChanged { .. }
        )
    }
}

/// Receiver of raw hardware notifications
pub trait DeviceEventListener: Send + Sync {
    fn on_device_event(&self, event: RawDeviceEvent);
}

/// Handle of a device-callback registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCallbackRegistration(pub u64);

/// OS audio subsystem
pub trait AudioManager: Send + Sync {
    /// Whether the platform exposes direct communication-device assignment
    fn supports_communication_device(&self) -> bool;

    /// Devices usable for communication (newer platforms)
    fn available_communication_devices(&self) -> CallBridgeResult<Vec<AudioEndpoint>>;

    /// Currently active communication device (newer platforms)
    fn communication_device(&self) -> CallBridgeResult<Option<DeviceId>>;

    /// Route communication audio to the device (newer platforms)
    fn set_communication_device(&self, id: DeviceId) -> CallBridgeResult<bool>;

    /// General output-device list (older platforms)
    fn output_devices(&self) -> CallBridgeResult<Vec<AudioEndpoint>>;

    fn start_bluetooth_sco(&self) -> CallBridgeResult<()>;
    fn stop_bluetooth_sco(&self) -> CallBridgeResult<()>;
    fn set_bluetooth_sco_on(&self, on: bool) -> CallBridgeResult<()>;
    fn set_speakerphone_on(&self, on: bool) -> CallBridgeResult<()>;

    fn set_mode(&self, mode: AudioMode) -> CallBridgeResult<()>;
    fn request_audio_focus(&self, request: &FocusRequest) -> CallBridgeResult<FocusResult>;
    fn abandon_audio_focus(&self, handle: FocusHandle) -> CallBridgeResult<()>;

    fn register_device_callback(
        &self,
        listener: Arc<dyn DeviceEventListener>,
    ) -> CallBridgeResult<DeviceCallbackRegistration>;
    fn unregister_device_callback(&self, registration: DeviceCallbackRegistration) -> CallBridgeResult<()>;
}

/// Receiver of raw telephony call-state codes
pub trait CallStateSink: Send + Sync {
    fn on_raw_call_state(&self, code: i32);
}

/// Handle of a telephony listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TelephonyRegistration(pub u64);

/// OS telephony service
pub trait TelephonyManager: Send + Sync {
    /// Whether the newer callback-object API is available
    fn supports_telephony_callback(&self) -> bool;

    /// Register through the newer callback-object API
    fn register_telephony_callback(&self, sink: Arc<dyn CallStateSink>) -> CallBridgeResult<TelephonyRegistration>;

    /// Register through the legacy phone-state listener API
    fn listen_call_state(&self, sink: Arc<dyn CallStateSink>) -> CallBridgeResult<TelephonyRegistration>;

    fn unregister(&self, registration: TelephonyRegistration) -> CallBridgeResult<()>;
}

/// Foreground service carrying the ongoing-call notification
pub trait ForegroundServiceHost: Send + Sync {
    fn start(&self, notification: &NotificationContent) -> CallBridgeResult<()>;
    fn update(&self, notification: &NotificationContent) -> CallBridgeResult<()>;
    fn stop(&self) -> CallBridgeResult<()>;
}

/// Picture-in-picture window control
pub trait PictureInPictureHost: Send + Sync {
    fn is_in_pip_mode(&self) -> bool;
    /// Bounds of the video surface, used as the PiP source rect
    fn video_source_rect(&self) -> Option<Rect>;
    fn enter_pip(&self, params: &PipParams) -> CallBridgeResult<bool>;
    fn set_pip_params(&self, params: &PipParams) -> CallBridgeResult<()>;
}

/// Window keep-screen-on flag
pub trait ScreenWakeHost: Send + Sync {
    fn set_keep_screen_on(&self, on: bool) -> CallBridgeResult<()>;
}

/// Brings the app task back in front of the system UI
pub trait AppLauncher: Send + Sync {
    fn bring_to_foreground(&self) -> CallBridgeResult<()>;
}

/// Task posted to the UI-owning thread
pub type MainThreadTask = Box<dyn FnOnce() + Send + 'static>;

/// Posts work to the UI-owning thread
pub trait MainThreadDispatcher: Send + Sync {
    fn dispatch(&self, task: MainThreadTask);
}

/// OS-level permissions treated as preconditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    RecordAudio,
    BluetoothConnect,
    ReadPhoneState,
    PostNotifications,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::RecordAudio,
        Permission::BluetoothConnect,
        Permission::ReadPhoneState,
        Permission::PostNotifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::RecordAudio => "RECORD_AUDIO",
            Permission::BluetoothConnect => "BLUETOOTH_CONNECT",
            Permission::ReadPhoneState => "READ_PHONE_STATE",
            Permission::PostNotifications => "POST_NOTIFICATIONS",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission queries
pub trait PermissionChecker: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;
}

/// Every OS collaborator the bridge needs
#[derive(Clone)]
pub struct PlatformServices {
    pub audio: Arc<dyn AudioManager>,
    pub telephony: Arc<dyn TelephonyManager>,
    pub foreground_service: Arc<dyn ForegroundServiceHost>,
    pub pip: Arc<dyn PictureInPictureHost>,
    pub screen: Arc<dyn ScreenWakeHost>,
    pub launcher: Arc<dyn AppLauncher>,
    pub dispatcher: Arc<dyn MainThreadDispatcher>,
    pub permissions: Arc<dyn PermissionChecker>,
}

impl fmt::Debug for PlatformServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sco_sub_events() {
        assert!(RawDeviceEvent::ScoAudioStateChanged(ScoAudioState::Connected).is_sco_sub_event());
        assert!(RawDeviceEvent::BluetoothAdapterStateChanged { enabled: false }.is_sco_sub_event());
        assert!(RawDeviceEvent::HeadsetConnectionChanged { connected: true }.is_sco_sub_event());
        assert!(!RawDeviceEvent::DevicesAdded(vec![]).is_sco_sub_event());
        assert!(!RawDeviceEvent::CommunicationDeviceChanged(None).is_sco_sub_event());
    }

    #[test]
    fn test_voice_focus_request() {
        let request = FocusRequest::voice_communication();
        assert_eq!(request.usage, AudioUsage::VoiceCommunication);
        assert_eq!(request.content_type, AudioContentType::Speech);
        assert_eq!(request.gain, FocusGain::Gain);
    }
}
