//! In-memory platform
//!
//! Implements every capability trait over plain state. Each OS call is
//! recorded as a [`PlatformCall`], hardware and telephony callbacks can be
//! triggered by hand, and failures can be injected per service. Backs the
//! test-suite and the simulator binary.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    AppLauncher, AudioManager, AudioMode, CallStateSink, DeviceCallbackRegistration, DeviceEventListener,
    FocusHandle, FocusRequest, FocusResult, ForegroundServiceHost, MainThreadDispatcher, MainThreadTask,
    Permission, PermissionChecker, PictureInPictureHost, PlatformServices, RawDeviceEvent, ScreenWakeHost,
    TelephonyManager, TelephonyRegistration,
};
use crate::audio::device::{raw_type, AudioEndpoint, DeviceId};
use crate::error::{CallBridgeError, CallBridgeResult};
use crate::session::notification::NotificationContent;
use crate::session::pip::{PipParams, Rect};

/// One recorded OS call
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    SetMode(AudioMode),
    RequestAudioFocus,
    AbandonAudioFocus(FocusHandle),
    SetCommunicationDevice(DeviceId),
    StartBluetoothSco,
    StopBluetoothSco,
    SetBluetoothScoOn(bool),
    SetSpeakerphoneOn(bool),
    RegisterDeviceCallback(DeviceCallbackRegistration),
    UnregisterDeviceCallback(DeviceCallbackRegistration),
    RegisterTelephonyCallback(TelephonyRegistration),
    ListenCallState(TelephonyRegistration),
    UnregisterTelephony(TelephonyRegistration),
    StartForegroundService(NotificationContent),
    UpdateNotification(NotificationContent),
    StopForegroundService,
    EnterPip(PipParams),
    SetPipParams(PipParams),
    SetKeepScreenOn(bool),
    BringToForeground,
}

struct MockState {
    calls: Vec<PlatformCall>,
    next_handle: u64,

    // audio
    supports_communication_device: bool,
    devices: Vec<AudioEndpoint>,
    active_device: Option<DeviceId>,
    speakerphone_on: bool,
    sco_on: bool,
    mode: AudioMode,
    focus_result: FocusResult,
    audio_unavailable: bool,
    fail_device_switch: bool,
    device_listeners: BTreeMap<u64, Arc<dyn DeviceEventListener>>,

    // telephony
    supports_telephony_callback: bool,
    telephony_sinks: BTreeMap<u64, Arc<dyn CallStateSink>>,

    // host
    granted: HashSet<Permission>,
    service_running: bool,
    fail_foreground_start: bool,
    notification: Option<NotificationContent>,
    in_pip: bool,
    video_rect: Option<Rect>,
    pip_params: Option<PipParams>,
    keep_screen_on: bool,

    // main thread
    deferred_dispatch: bool,
    main_thread_queue: Vec<MainThreadTask>,
}

/// In-memory implementation of every platform trait
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    /// A platform with no attached devices, every capability and permission
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                next_handle: 1,
                supports_communication_device: true,
                devices: Vec::new(),
                active_device: None,
                speakerphone_on: false,
                sco_on: false,
                mode: AudioMode::Normal,
                focus_result: FocusResult::Granted(FocusHandle(0)),
                audio_unavailable: false,
                fail_device_switch: false,
                device_listeners: BTreeMap::new(),
                supports_telephony_callback: true,
                telephony_sinks: BTreeMap::new(),
                granted: Permission::ALL.into_iter().collect(),
                service_running: false,
                fail_foreground_start: false,
                notification: None,
                in_pip: false,
                video_rect: None,
                pip_params: None,
                keep_screen_on: false,
                deferred_dispatch: false,
                main_thread_queue: Vec::new(),
            }),
        }
    }

    /// A handset with a built-in earpiece (id 1) and speaker (id 2)
    pub fn phone() -> Self {
        let platform = Self::new();
        platform.set_devices(vec![
            AudioEndpoint::new(1, raw_type::BUILTIN_EARPIECE),
            AudioEndpoint::new(2, raw_type::BUILTIN_SPEAKER),
        ]);
        platform
    }

    /// Bundle this platform as every service of the bridge
    pub fn services(self: &Arc<Self>) -> PlatformServices {
        PlatformServices {
            audio: self.clone(),
            telephony: self.clone(),
            foreground_service: self.clone(),
            pip: self.clone(),
            screen: self.clone(),
            launcher: self.clone(),
            dispatcher: self.clone(),
            permissions: self.clone(),
        }
    }

    // --- scripting -------------------------------------------------------

    /// Replace the attached device set without notifying listeners
    pub fn set_devices(&self, devices: Vec<AudioEndpoint>) {
        self.state.lock().devices = devices;
    }

    /// Attach a device and notify registered listeners
    pub fn attach(&self, endpoint: AudioEndpoint) {
        self.state.lock().devices.push(endpoint.clone());
        self.emit_device_event(RawDeviceEvent::DevicesAdded(vec![endpoint]));
    }

    /// Detach a device and notify registered listeners
    pub fn detach(&self, id: DeviceId) {
        let removed: Vec<AudioEndpoint> = {
            let mut state = self.state.lock();
            let (removed, kept): (Vec<AudioEndpoint>, Vec<AudioEndpoint>) =
                state.devices.drain(..).partition(|d| d.id == id);
            state.devices = kept;
            if state.active_device == Some(id) {
                state.active_device = None;
            }
            removed
        };
        if !removed.is_empty() {
            self.emit_device_event(RawDeviceEvent::DevicesRemoved(removed));
        }
    }

    /// Deliver a raw hardware event to every registered listener
    pub fn emit_device_event(&self, event: RawDeviceEvent) {
        let listeners: Vec<_> = self.state.lock().device_listeners.values().cloned().collect();
        for listener in listeners {
            listener.on_device_event(event.clone());
        }
    }

    /// Deliver a raw call-state code to every registered telephony sink
    pub fn emit_call_state(&self, code: i32) {
        let sinks: Vec<_> = self.state.lock().telephony_sinks.values().cloned().collect();
        for sink in sinks {
            sink.on_raw_call_state(code);
        }
    }

    pub fn set_supports_communication_device(&self, supported: bool) {
        self.state.lock().supports_communication_device = supported;
    }

    pub fn set_supports_telephony_callback(&self, supported: bool) {
        self.state.lock().supports_telephony_callback = supported;
    }

    /// Answer returned to the next focus requests (granted handles are fresh)
    pub fn set_focus_result(&self, result: FocusResult) {
        self.state.lock().focus_result = result;
    }

    /// Make every audio call fail as if the audio service were missing
    pub fn set_audio_unavailable(&self, unavailable: bool) {
        self.state.lock().audio_unavailable = unavailable;
    }

    pub fn set_fail_device_switch(&self, fail: bool) {
        self.state.lock().fail_device_switch = fail;
    }

    pub fn set_active_device(&self, id: Option<DeviceId>) {
        self.state.lock().active_device = id;
    }

    pub fn grant(&self, permission: Permission) {
        self.state.lock().granted.insert(permission);
    }

    pub fn revoke(&self, permission: Permission) {
        self.state.lock().granted.remove(&permission);
    }

    pub fn set_fail_foreground_start(&self, fail: bool) {
        self.state.lock().fail_foreground_start = fail;
    }

    pub fn set_in_pip(&self, in_pip: bool) {
        self.state.lock().in_pip = in_pip;
    }

    pub fn set_video_rect(&self, rect: Option<Rect>) {
        self.state.lock().video_rect = rect;
    }

    /// Queue main-thread tasks until [`MockPlatform::run_main_thread`]
    /// instead of running them inline
    pub fn set_deferred_dispatch(&self, deferred: bool) {
        self.state.lock().deferred_dispatch = deferred;
    }

    /// Run queued main-thread tasks, including ones they post, and return
    /// how many ran
    pub fn run_main_thread(&self) -> usize {
        let mut ran = 0;
        loop {
            let tasks = std::mem::take(&mut self.state.lock().main_thread_queue);
            if tasks.is_empty() {
                return ran;
            }
            for task in tasks {
                task();
                ran += 1;
            }
        }
    }

    pub fn pending_main_thread_tasks(&self) -> usize {
        self.state.lock().main_thread_queue.len()
    }

    // --- inspection ------------------------------------------------------

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of recorded calls matching the predicate
    pub fn count_calls(&self, predicate: impl Fn(&PlatformCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn devices(&self) -> Vec<AudioEndpoint> {
        self.state.lock().devices.clone()
    }

    pub fn active_device(&self) -> Option<DeviceId> {
        self.state.lock().active_device
    }

    pub fn speakerphone_on(&self) -> bool {
        self.state.lock().speakerphone_on
    }

    pub fn sco_on(&self) -> bool {
        self.state.lock().sco_on
    }

    pub fn mode(&self) -> AudioMode {
        self.state.lock().mode
    }

    pub fn device_listener_count(&self) -> usize {
        self.state.lock().device_listeners.len()
    }

    pub fn telephony_listener_count(&self) -> usize {
        self.state.lock().telephony_sinks.len()
    }

    pub fn service_running(&self) -> bool {
        self.state.lock().service_running
    }

    pub fn notification(&self) -> Option<NotificationContent> {
        self.state.lock().notification.clone()
    }

    pub fn pip_params(&self) -> Option<PipParams> {
        self.state.lock().pip_params.clone()
    }

    pub fn keep_screen_on(&self) -> bool {
        self.state.lock().keep_screen_on
    }

    fn next_handle(state: &mut MockState) -> u64 {
        let handle = state.next_handle;
        state.next_handle += 1;
        handle
    }

    fn audio_state(&self) -> CallBridgeResult<parking_lot::MutexGuard<'_, MockState>> {
        let state = self.state.lock();
        if state.audio_unavailable {
            return Err(CallBridgeError::service_unavailable("audio"));
        }
        Ok(state)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioManager for MockPlatform {
    fn supports_communication_device(&self) -> bool {
        self.state.lock().supports_communication_device
    }

    fn available_communication_devices(&self) -> CallBridgeResult<Vec<AudioEndpoint>> {
        let state = self.audio_state()?;
        Ok(state.devices.iter().filter(|d| !d.is_telephony()).cloned().collect())
    }

    fn communication_device(&self) -> CallBridgeResult<Option<DeviceId>> {
        Ok(self.audio_state()?.active_device)
    }

    fn set_communication_device(&self, id: DeviceId) -> CallBridgeResult<bool> {
        let mut state = self.audio_state()?;
        state.calls.push(PlatformCall::SetCommunicationDevice(id));
        if state.fail_device_switch {
            return Err(CallBridgeError::platform("setCommunicationDevice", "injected failure"));
        }
        if !state.devices.iter().any(|d| d.id == id) {
            return Ok(false);
        }
        state.active_device = Some(id);
        Ok(true)
    }

    fn output_devices(&self) -> CallBridgeResult<Vec<AudioEndpoint>> {
        Ok(self.audio_state()?.devices.clone())
    }

    fn start_bluetooth_sco(&self) -> CallBridgeResult<()> {
        let mut state = self.audio_state()?;
        state.calls.push(PlatformCall::StartBluetoothSco);
        if state.fail_device_switch {
            return Err(CallBridgeError::platform("startBluetoothSco", "injected failure"));
        }
        Ok(())
    }

    fn stop_bluetooth_sco(&self) -> CallBridgeResult<()> {
        self.audio_state()?.calls.push(PlatformCall::StopBluetoothSco);
        Ok(())
    }

    fn set_bluetooth_sco_on(&self, on: bool) -> CallBridgeResult<()> {
        let mut state = self.audio_state()?;
        state.calls.push(PlatformCall::SetBluetoothScoOn(on));
        state.sco_on = on;
        Ok(())
    }

    fn set_speakerphone_on(&self, on: bool) -> CallBridgeResult<()> {
        let mut state = self.audio_state()?;
        state.calls.push(PlatformCall::SetSpeakerphoneOn(on));
        state.speakerphone_on = on;
        Ok(())
    }

    fn set_mode(&self, mode: AudioMode) -> CallBridgeResult<()> {
        let mut state = self.audio_state()?;
        state.calls.push(PlatformCall::SetMode(mode));
        state.mode = mode;
        Ok(())
    }

    fn request_audio_focus(&self, _request: &FocusRequest) -> CallBridgeResult<FocusResult> {
        let mut state = self.audio_state()?;
        state.calls.push(PlatformCall::RequestAudioFocus);
        match state.focus_result {
            FocusResult::Granted(_) => {
                let handle = Self::next_handle(&mut state);
                Ok(FocusResult::Granted(FocusHandle(handle)))
            }
            other => Ok(other),
        }
    }

    fn abandon_audio_focus(&self, handle: FocusHandle) -> CallBridgeResult<()> {
        self.audio_state()?.calls.push(PlatformCall::AbandonAudioFocus(handle));
        Ok(())
    }

    fn register_device_callback(
        &self,
        listener: Arc<dyn DeviceEventListener>,
    ) -> CallBridgeResult<DeviceCallbackRegistration> {
        let mut state = self.audio_state()?;
        let registration = DeviceCallbackRegistration(Self::next_handle(&mut state));
        state.device_listeners.insert(registration.0, listener);
        state.calls.push(PlatformCall::RegisterDeviceCallback(registration));
        Ok(registration)
    }

    fn unregister_device_callback(&self, registration: DeviceCallbackRegistration) -> CallBridgeResult<()> {
        let mut state = self.audio_state()?;
        state.device_listeners.remove(&registration.0);
        state.calls.push(PlatformCall::UnregisterDeviceCallback(registration));
        Ok(())
    }
}

impl TelephonyManager for MockPlatform {
    fn supports_telephony_callback(&self) -> bool {
        self.state.lock().supports_telephony_callback
    }

    fn register_telephony_callback(&self, sink: Arc<dyn CallStateSink>) -> CallBridgeResult<TelephonyRegistration> {
        let mut state = self.state.lock();
        let registration = TelephonyRegistration(Self::next_handle(&mut state));
        state.telephony_sinks.insert(registration.0, sink);
        state.calls.push(PlatformCall::RegisterTelephonyCallback(registration));
        Ok(registration)
    }

    fn listen_call_state(&self, sink: Arc<dyn CallStateSink>) -> CallBridgeResult<TelephonyRegistration> {
        let mut state = self.state.lock();
        let registration = TelephonyRegistration(Self::next_handle(&mut state));
        state.telephony_sinks.insert(registration.0, sink);
        state.calls.push(PlatformCall::ListenCallState(registration));
        Ok(registration)
    }

    fn unregister(&self, registration: TelephonyRegistration) -> CallBridgeResult<()> {
        let mut state = self.state.lock();
        state.telephony_sinks.remove(&registration.0);
        state.calls.push(PlatformCall::UnregisterTelephony(registration));
        Ok(())
    }
}

impl ForegroundServiceHost for MockPlatform {
    fn start(&self, notification: &NotificationContent) -> CallBridgeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::StartForegroundService(notification.clone()));
        if state.fail_foreground_start {
            return Err(CallBridgeError::platform("startForeground", "injected failure"));
        }
        state.service_running = true;
        state.notification = Some(notification.clone());
        Ok(())
    }

    fn update(&self, notification: &NotificationContent) -> CallBridgeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::UpdateNotification(notification.clone()));
        state.notification = Some(notification.clone());
        Ok(())
    }

    fn stop(&self) -> CallBridgeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::StopForegroundService);
        state.service_running = false;
        state.notification = None;
        Ok(())
    }
}

impl PictureInPictureHost for MockPlatform {
    fn is_in_pip_mode(&self) -> bool {
        self.state.lock().in_pip
    }

    fn video_source_rect(&self) -> Option<Rect> {
        self.state.lock().video_rect
    }

    fn enter_pip(&self, params: &PipParams) -> CallBridgeResult<bool> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::EnterPip(params.clone()));
        state.in_pip = true;
        state.pip_params = Some(params.clone());
        Ok(true)
    }

    fn set_pip_params(&self, params: &PipParams) -> CallBridgeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::SetPipParams(params.clone()));
        state.pip_params = Some(params.clone());
        Ok(())
    }
}

impl ScreenWakeHost for MockPlatform {
    fn set_keep_screen_on(&self, on: bool) -> CallBridgeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::SetKeepScreenOn(on));
        state.keep_screen_on = on;
        Ok(())
    }
}

impl AppLauncher for MockPlatform {
    fn bring_to_foreground(&self) -> CallBridgeResult<()> {
        self.state.lock().calls.push(PlatformCall::BringToForeground);
        Ok(())
    }
}

/// Runs posted tasks inline on the calling thread unless dispatch is
/// deferred
impl MainThreadDispatcher for MockPlatform {
    fn dispatch(&self, task: MainThreadTask) {
        let mut state = self.state.lock();
        if state.deferred_dispatch {
            state.main_thread_queue.push(task);
            return;
        }
        drop(state);
        task();
    }
}

impl PermissionChecker for MockPlatform {
    fn is_granted(&self, permission: Permission) -> bool {
        self.state.lock().granted.contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<RawDeviceEvent>>);

    impl DeviceEventListener for Recorder {
        fn on_device_event(&self, event: RawDeviceEvent) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn test_attach_and_detach_notify_listeners() {
        let platform = MockPlatform::phone();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let registration = platform.register_device_callback(recorder.clone()).unwrap();

        platform.attach(AudioEndpoint::new(7, raw_type::BLUETOOTH_SCO));
        platform.detach(DeviceId(7));
        platform.detach(DeviceId(99));

        assert_eq!(recorder.0.lock().len(), 2);
        assert_eq!(platform.devices().len(), 2);

        platform.unregister_device_callback(registration).unwrap();
        assert_eq!(platform.device_listener_count(), 0);
    }

    #[test]
    fn test_communication_devices_exclude_telephony() {
        let platform = MockPlatform::phone();
        platform.set_devices(vec![
            AudioEndpoint::new(1, raw_type::BUILTIN_EARPIECE),
            AudioEndpoint::new(3, raw_type::TELEPHONY),
        ]);

        assert_eq!(platform.available_communication_devices().unwrap().len(), 1);
        assert_eq!(platform.output_devices().unwrap().len(), 2);
    }

    #[test]
    fn test_deferred_dispatch_queues_until_run() {
        let platform = MockPlatform::new();
        platform.set_deferred_dispatch(true);
        let ran = Arc::new(Mutex::new(Vec::new()));

        let first = ran.clone();
        platform.dispatch(Box::new(move || first.lock().push(1)));
        let second = ran.clone();
        platform.dispatch(Box::new(move || second.lock().push(2)));
        assert!(ran.lock().is_empty());
        assert_eq!(platform.pending_main_thread_tasks(), 2);

        assert_eq!(platform.run_main_thread(), 2);
        assert_eq!(*ran.lock(), vec![1, 2]);
        assert_eq!(platform.run_main_thread(), 0);
    }

    #[test]
    fn test_unavailable_audio_service() {
        let platform = MockPlatform::phone();
        platform.set_audio_unavailable(true);

        let err = platform.available_communication_devices().unwrap_err();
        assert!(err.is_service_unavailable());
    }
}
