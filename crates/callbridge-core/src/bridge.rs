//! Inward command surface
//!
//! [`CallBridge`] owns one instance of every component and exposes the
//! commands the application layer calls. Commands never fail past this
//! boundary: platform errors are logged and reduced to `bool` or a no-op.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::{AudioFocusController, AudioRoutingCoordinator, DeviceChangeDebouncer, DeviceId, FocusState, RoutingDecision};
use crate::config::BridgeConfig;
use crate::error::{CallBridgeError, CallBridgeResult};
use crate::events::{BridgeEvent, EventEmitter, EventStream};
use crate::platform::{DeviceCallbackRegistration, Permission, PlatformServices};
use crate::session::{SessionAction, SessionOrchestrator, SessionStateHandle, UiSessionState};
use crate::telephony::{CallState, CallStateCallback, CallStateListener};

/// Audio routing and call-session coordinator
pub struct CallBridge {
    config: BridgeConfig,
    platform: PlatformServices,
    events: EventEmitter,
    focus: AudioFocusController,
    routing: Arc<AudioRoutingCoordinator>,
    debouncer: Arc<DeviceChangeDebouncer>,
    device_registration: Mutex<Option<DeviceCallbackRegistration>>,
    call_listener: CallStateListener,
    orchestrator: Arc<SessionOrchestrator>,
}

impl CallBridge {
    /// Build every component.
    ///
    /// Must be called inside a Tokio runtime; timers are spawned on it.
    pub fn new(config: BridgeConfig, platform: PlatformServices) -> CallBridgeResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| CallBridgeError::runtime(format!("no Tokio runtime for bridge timers: {}", e)))?;

        let events = EventEmitter::new(config.event_channel_capacity);
        let focus = AudioFocusController::new(platform.audio.clone(), events.clone());
        let routing = Arc::new(AudioRoutingCoordinator::new(platform.audio.clone(), events.clone()));
        let debouncer = Arc::new(DeviceChangeDebouncer::new(
            routing.clone(),
            config.device_debounce(),
            runtime.clone(),
        ));
        let call_listener = CallStateListener::new(&platform, events.clone(), config.call_state_format, runtime.clone());
        let orchestrator = Arc::new(SessionOrchestrator::new(config.clone(), &platform, runtime));

        info!(
            "Call bridge ready (routing: {:?}, telephony: {:?})",
            routing.strategy(),
            call_listener.backend()
        );

        Ok(Self {
            config,
            platform,
            events,
            focus,
            routing,
            debouncer,
            device_registration: Mutex::new(None),
            call_listener,
            orchestrator,
        })
    }

    /// Start with a [`CallBridgeBuilder`]
    pub fn builder() -> CallBridgeBuilder {
        CallBridgeBuilder::new()
    }

    /// (Re)register for device notifications and run an initializing routing pass
    pub fn init_audio_devices(&self) {
        {
            let mut registration = self.device_registration.lock();
            if let Some(previous) = registration.take() {
                debug!("Replacing device callback registration {:?}", previous);
                self.debouncer.cancel();
                if let Err(e) = self.platform.audio.unregister_device_callback(previous) {
                    warn!("Failed to unregister device callback: {}", e);
                }
            }

            match self.platform.audio.register_device_callback(self.debouncer.clone()) {
                Ok(handle) => *registration = Some(handle),
                Err(e) => warn!("Failed to register device callback: {}", e),
            }
        }

        self.routing.on_devices_changed(None, true);
    }

    /// Re-evaluate routing now, honouring an explicit user choice
    pub fn handle_devices_change(&self, device_id: Option<DeviceId>) {
        self.routing.on_devices_changed(device_id, false);
    }

    pub fn request_audio_focus(&self) -> bool {
        self.focus.request_focus()
    }

    pub fn abandon_audio_focus(&self) {
        self.focus.abandon_focus();
    }

    /// OS audio-focus change callback
    pub fn on_audio_focus_change(&self, event_code: i32) {
        self.focus.on_focus_change(event_code);
    }

    pub fn update_ui_state(&self, mic_on: bool, in_room: bool, room: Option<String>, cam_muted: bool) {
        self.orchestrator.update_ui_state(mic_on, in_room, room, cam_muted);
    }

    pub fn activate_pip(&self) -> bool {
        self.orchestrator.activate_pip()
    }

    /// Start call-state listening, wired into the session orchestrator.
    ///
    /// Honours `call_listener_init_delay_ms`. Returns `false` when
    /// listening is disabled (missing permission or registration failure).
    pub fn start_foreground_listener(&self) -> bool {
        let orchestrator = Arc::downgrade(&self.orchestrator);
        let callback: CallStateCallback = Arc::new(move |transition| {
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.on_call_state(transition);
            }
        });
        self.call_listener
            .initialize_after(self.config.call_listener_init_delay(), callback)
    }

    /// Check every required permission and report the result
    pub fn check_permissions(&self) -> bool {
        let missing: Vec<Permission> = Permission::ALL
            .into_iter()
            .filter(|permission| !self.platform.permissions.is_granted(*permission))
            .collect();

        if !missing.is_empty() {
            warn!("Missing permissions: {:?}", missing);
        }
        let all_granted = missing.is_empty();
        self.events.emit(BridgeEvent::PermissionsStatus { all_granted });
        all_granted
    }

    pub fn on_app_foreground(&self) {
        self.orchestrator.on_app_foreground();
    }

    pub fn on_app_background(&self) {
        self.orchestrator.on_app_background();
    }

    /// A notification or PiP button was pressed
    pub fn on_notification_action(&self, action: SessionAction) {
        debug!("Notification action {}", action);
        self.events.emit(BridgeEvent::NotificationAction { action });
    }

    /// Broadcast receiver entry point taking the raw action string.
    /// Returns `false` for actions this bridge did not register.
    pub fn on_notification_broadcast(&self, action: &str) -> bool {
        match SessionAction::from_broadcast(action, &self.config.notification.action_prefix) {
            Some(action) => {
                self.on_notification_action(action);
                true
            }
            None => {
                warn!("Ignoring unknown broadcast action '{}'", action);
                false
            }
        }
    }

    /// Tear down listeners, timers, focus and the foreground service.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        self.call_listener.cleanup();
        self.debouncer.cancel();

        if let Some(registration) = self.device_registration.lock().take() {
            if let Err(e) = self.platform.audio.unregister_device_callback(registration) {
                warn!("Failed to unregister device callback: {}", e);
            }
        }

        if self.focus.has_focus() {
            self.focus.abandon_focus();
        }
        self.orchestrator.shutdown();
        self.routing.reset();
        debug!("Call bridge shut down");
    }

    /// Outward events as a stream
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Outward events as a plain receiver
    pub fn subscribe_receiver(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe_receiver()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn routing_decision(&self) -> RoutingDecision {
        self.routing.decision()
    }

    pub fn focus_state(&self) -> FocusState {
        self.focus.state()
    }

    pub fn call_state(&self) -> CallState {
        self.call_listener.state()
    }

    pub fn is_call_listener_initialized(&self) -> bool {
        self.call_listener.is_initialized()
    }

    pub fn ui_state(&self) -> UiSessionState {
        self.orchestrator.ui_state()
    }

    /// Read-only view of the session flags
    pub fn session(&self) -> SessionStateHandle {
        self.orchestrator.session()
    }

    pub fn is_foreground_service_running(&self) -> bool {
        self.orchestrator.service_running()
    }
}

impl Drop for CallBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builder for [`CallBridge`]
#[derive(Debug, Default)]
pub struct CallBridgeBuilder {
    config: BridgeConfig,
    platform: Option<PlatformServices>,
}

impl CallBridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn platform(mut self, platform: PlatformServices) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn device_debounce(mut self, window: Duration) -> Self {
        self.config = self.config.with_device_debounce(window);
        self
    }

    pub fn foreground_transition_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_foreground_transition_delay(delay);
        self
    }

    pub fn call_listener_init_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_call_listener_init_delay(delay);
        self
    }

    pub fn build(self) -> CallBridgeResult<CallBridge> {
        let platform = self
            .platform
            .ok_or_else(|| CallBridgeError::config("platform services are required"))?;
        CallBridge::new(self.config, platform)
    }
}
