//! Session lifecycle orchestrator
//!
//! Decides, from the current flags, whether the foreground service runs,
//! what its notification shows, which PiP parameters apply and whether the
//! screen is kept awake. Every input funnels into one level-triggered
//! reconcile step, so repeating an input with identical values changes
//! nothing.
//!
//! Foreground/background signals are debounced per direction and
//! re-checked against the latest signal when the delay expires, so
//! app-switcher flicker never starts and immediately stops the service.
//!
//! Host calls are posted through the main-thread dispatcher after the state
//! lock is released.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::notification::{build_notification, NotificationContent};
use super::pip::{build_pip_params, PipParams};
use super::state::{SessionStateHandle, UiSessionState};
use crate::config::BridgeConfig;
use crate::error::CallBridgeResult;
use crate::platform::{ForegroundServiceHost, MainThreadDispatcher, PictureInPictureHost, PlatformServices, ScreenWakeHost};
use crate::telephony::{CallState, CallTransition};
use crate::timer::TimerSlot;

/// Host-side effect produced by a reconcile step
#[derive(Debug, Clone, PartialEq)]
enum HostCommand {
    StartService(NotificationContent),
    UpdateNotification(NotificationContent),
    StopService,
    KeepScreenOn(bool),
    /// Rebuild the PiP parameters if the window is in PiP mode
    RefreshPip,
}

#[derive(Debug, Default)]
struct OrchestratorState {
    ui: UiSessionState,
    call_state: CallState,
    /// Most recent visibility signal, confirmed or not
    reported_foreground: bool,
    service_running: bool,
    last_notification: Option<NotificationContent>,
    keep_screen_on: bool,
    last_pip: Option<PipParams>,
}

struct OrchestratorInner {
    config: BridgeConfig,
    foreground_service: Arc<dyn ForegroundServiceHost>,
    pip: Arc<dyn PictureInPictureHost>,
    screen: Arc<dyn ScreenWakeHost>,
    dispatcher: Arc<dyn MainThreadDispatcher>,
    session: SessionStateHandle,
    state: Mutex<OrchestratorState>,
    foreground_timer: TimerSlot,
    background_timer: TimerSlot,
}

impl OrchestratorInner {
    fn reconcile(&self, state: &mut OrchestratorState) -> Vec<HostCommand> {
        let mut commands = Vec::new();
        let ui = &state.ui;
        let foreground = ui.is_app_foreground;

        if state.service_running {
            let ended_in_background = !foreground && !ui.is_session_active();
            let muted_in_foreground = foreground && !ui.mic_on;
            if ended_in_background || muted_in_foreground {
                state.service_running = false;
                state.last_notification = None;
                commands.push(HostCommand::StopService);
            } else {
                let notification = build_notification(ui, state.call_state, &self.config.notification);
                if state.last_notification.as_ref() != Some(&notification) {
                    state.last_notification = Some(notification.clone());
                    commands.push(HostCommand::UpdateNotification(notification));
                }
            }
        } else if !foreground && ui.mic_on {
            let notification = build_notification(ui, state.call_state, &self.config.notification);
            state.service_running = true;
            state.last_notification = Some(notification.clone());
            commands.push(HostCommand::StartService(notification));
        }

        let screen_on = ui.wants_screen_on();
        if screen_on != state.keep_screen_on {
            state.keep_screen_on = screen_on;
            commands.push(HostCommand::KeepScreenOn(screen_on));
        }

        commands.push(HostCommand::RefreshPip);
        commands
    }

    /// Post commands to the UI thread. The task owns the inner state so
    /// teardown commands still reach the host after the bridge is dropped.
    fn execute(self: &Arc<Self>, commands: Vec<HostCommand>) {
        if commands.is_empty() {
            return;
        }
        let inner = self.clone();
        self.dispatcher.dispatch(Box::new(move || inner.run_on_main_thread(commands)));
    }

    fn run_on_main_thread(&self, commands: Vec<HostCommand>) {
        for command in commands {
            debug!("Host command {:?}", command);
            let result = match &command {
                HostCommand::StartService(notification) => self.foreground_service.start(notification),
                HostCommand::UpdateNotification(notification) => self.foreground_service.update(notification),
                HostCommand::StopService => self.foreground_service.stop(),
                HostCommand::KeepScreenOn(on) => self.screen.set_keep_screen_on(*on),
                HostCommand::RefreshPip => self.refresh_pip(),
            };

            match (command, result) {
                (_, Ok(())) => {}
                (HostCommand::StartService(_), Err(e)) => {
                    warn!("Foreground service failed to start, continuing without notification: {}", e);
                    let mut state = self.state.lock();
                    state.service_running = false;
                    state.last_notification = None;
                }
                (command, Err(e)) => warn!("Host command {:?} failed: {}", command, e),
            }
        }
    }

    /// UI thread only: window queries
    fn refresh_pip(&self) -> CallBridgeResult<()> {
        if !self.pip.is_in_pip_mode() {
            return Ok(());
        }
        let source_rect = self.pip.video_source_rect();
        let params = {
            let mut state = self.state.lock();
            let params = build_pip_params(
                &state.ui,
                source_rect,
                &self.config.pip,
                &self.config.notification.action_prefix,
            );
            if state.last_pip.as_ref() == Some(&params) {
                return Ok(());
            }
            state.last_pip = Some(params.clone());
            params
        };
        let result = self.pip.set_pip_params(&params);
        if result.is_err() {
            self.state.lock().last_pip = None;
        }
        result
    }

    fn confirm_visibility(self: &Arc<Self>, foreground: bool) {
        let commands = {
            let mut state = self.state.lock();
            if state.reported_foreground != foreground {
                debug!(
                    "Visibility changed again before the {} transition settled",
                    if foreground { "foreground" } else { "background" }
                );
                return;
            }
            if state.ui.is_app_foreground != foreground {
                info!("App moved to {}", if foreground { "foreground" } else { "background" });
            }
            state.ui.is_app_foreground = foreground;
            self.session.publish(&state.ui);
            self.reconcile(&mut state)
        };
        self.execute(commands);
    }
}

/// Drives the foreground service, notification, PiP and screen wake
pub struct SessionOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl SessionOrchestrator {
    pub fn new(config: BridgeConfig, platform: &PlatformServices, runtime: Handle) -> Self {
        let ui = UiSessionState::default();
        let state = OrchestratorState {
            reported_foreground: ui.is_app_foreground,
            ui: ui.clone(),
            ..OrchestratorState::default()
        };
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                foreground_service: platform.foreground_service.clone(),
                pip: platform.pip.clone(),
                screen: platform.screen.clone(),
                dispatcher: platform.dispatcher.clone(),
                session: SessionStateHandle::new(ui),
                state: Mutex::new(state),
                foreground_timer: TimerSlot::new("app-foreground", runtime.clone()),
                background_timer: TimerSlot::new("app-background", runtime),
            }),
        }
    }

    /// Flags reported by the application layer
    pub fn update_ui_state(&self, mic_on: bool, in_room: bool, room: Option<String>, cam_muted: bool) {
        let commands = {
            let mut state = self.inner.state.lock();
            let next = state.ui.with_flags(mic_on, in_room, room, cam_muted);
            if next == state.ui {
                debug!("UI state unchanged");
                return;
            }
            debug!(
                "UI state: mic_on={} in_room={} cam_muted={} room={:?}",
                next.mic_on, next.in_room, next.cam_muted, next.room
            );
            state.ui = next;
            self.inner.session.publish(&state.ui);
            self.inner.reconcile(&mut state)
        };
        self.inner.execute(commands);
    }

    /// Accepted telephony transition
    pub fn on_call_state(&self, transition: CallTransition) {
        let commands = {
            let mut state = self.inner.state.lock();
            state.call_state = transition.to;
            self.inner.reconcile(&mut state)
        };
        self.inner.execute(commands);
    }

    pub fn on_app_foreground(&self) {
        self.schedule_visibility(true);
    }

    pub fn on_app_background(&self) {
        self.schedule_visibility(false);
    }

    fn schedule_visibility(&self, foreground: bool) {
        self.inner.state.lock().reported_foreground = foreground;

        let slot = if foreground {
            &self.inner.foreground_timer
        } else {
            &self.inner.background_timer
        };
        let inner: Weak<OrchestratorInner> = Arc::downgrade(&self.inner);
        slot.restart(self.inner.config.foreground_transition_delay(), move || {
            if let Some(inner) = inner.upgrade() {
                inner.confirm_visibility(foreground);
            }
        });
    }

    /// Enter picture-in-picture, or refresh the parameters when already in it.
    ///
    /// Talks to the window directly, so call it from the UI thread.
    pub fn activate_pip(&self) -> bool {
        let pip = &self.inner.pip;
        let params = {
            let state = self.inner.state.lock();
            build_pip_params(
                &state.ui,
                pip.video_source_rect(),
                &self.inner.config.pip,
                &self.inner.config.notification.action_prefix,
            )
        };

        let entered = if pip.is_in_pip_mode() {
            pip.set_pip_params(&params).map(|_| true)
        } else {
            pip.enter_pip(&params)
        };

        match entered {
            Ok(true) => {
                info!("Picture-in-picture active");
                self.inner.state.lock().last_pip = Some(params);
                true
            }
            Ok(false) => {
                warn!("Picture-in-picture refused by the platform");
                false
            }
            Err(e) => {
                warn!("Failed to enter picture-in-picture: {}", e);
                false
            }
        }
    }

    /// Cancel pending transitions and release the service and screen wake
    pub fn shutdown(&self) {
        self.inner.foreground_timer.cancel();
        self.inner.background_timer.cancel();

        let commands = {
            let mut state = self.inner.state.lock();
            let mut commands = Vec::new();
            if state.service_running {
                state.service_running = false;
                state.last_notification = None;
                commands.push(HostCommand::StopService);
            }
            if state.keep_screen_on {
                state.keep_screen_on = false;
                commands.push(HostCommand::KeepScreenOn(false));
            }
            state.last_pip = None;
            state.call_state = CallState::Idle;
            commands
        };
        self.inner.execute(commands);
    }

    /// Read-only view of the session flags
    pub fn session(&self) -> SessionStateHandle {
        self.inner.session.clone()
    }

    pub fn ui_state(&self) -> UiSessionState {
        self.inner.state.lock().ui.clone()
    }

    pub fn call_state(&self) -> CallState {
        self.inner.state.lock().call_state
    }

    pub fn service_running(&self) -> bool {
        self.inner.state.lock().service_running
    }

    pub fn keep_screen_on(&self) -> bool {
        self.inner.state.lock().keep_screen_on
    }

    /// A visibility transition is waiting for its delay
    pub fn is_transition_pending(&self) -> bool {
        self.inner.foreground_timer.is_pending() || self.inner.background_timer.is_pending()
    }
}
