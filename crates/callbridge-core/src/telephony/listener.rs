//! Call-state listener
//!
//! Registers with the telephony service through one of two backends and
//! turns raw call-state codes into [`CallTransition`]s. Reports are
//! processed one at a time under the session lock, so transitions reach
//! the callback in the order the OS delivered them.
//!
//! When a phone call ends (any state to IDLE) the app is brought back to
//! the foreground on the main thread.
//!
//! `initialize` and `cleanup` are idempotent and may be called in any
//! order; `cleanup` also cancels a pending delayed initialization.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use super::state::{CallSession, CallState, CallStateUpdate, CallTransition};
use crate::error::CallBridgeResult;
use crate::events::{BridgeEvent, CallStateEventFormat, CallStateLabel, EventEmitter};
use crate::platform::{
    AppLauncher, CallStateSink, MainThreadDispatcher, Permission, PermissionChecker, PlatformServices,
    TelephonyManager, TelephonyRegistration,
};
use crate::timer::TimerSlot;

/// Telephony registration API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelephonyBackend {
    /// Callback-object API
    TelephonyCallback,
    /// Legacy phone-state listener
    PhoneStateListener,
}

impl TelephonyBackend {
    pub fn detect(telephony: &dyn TelephonyManager) -> Self {
        if telephony.supports_telephony_callback() {
            TelephonyBackend::TelephonyCallback
        } else {
            TelephonyBackend::PhoneStateListener
        }
    }

    fn register(&self, telephony: &dyn TelephonyManager, sink: Arc<dyn CallStateSink>) -> CallBridgeResult<TelephonyRegistration> {
        match self {
            TelephonyBackend::TelephonyCallback => telephony.register_telephony_callback(sink),
            TelephonyBackend::PhoneStateListener => telephony.listen_call_state(sink),
        }
    }
}

/// Receives every accepted call-state transition
pub type CallStateCallback = Arc<dyn Fn(CallTransition) + Send + Sync>;

struct ListenerInner {
    telephony: Arc<dyn TelephonyManager>,
    permissions: Arc<dyn PermissionChecker>,
    launcher: Arc<dyn AppLauncher>,
    dispatcher: Arc<dyn MainThreadDispatcher>,
    events: EventEmitter,
    format: CallStateEventFormat,
    backend: TelephonyBackend,
    registration: Mutex<Option<TelephonyRegistration>>,
    callback: Mutex<Option<CallStateCallback>>,
    session: Mutex<CallSession>,
}

impl ListenerInner {
    fn initialize(self: &Arc<Self>, callback: CallStateCallback) -> bool {
        let mut registration = self.registration.lock();
        if registration.is_some() {
            debug!("Call-state listener already initialized");
            return true;
        }

        if !self.permissions.is_granted(Permission::ReadPhoneState) {
            warn!("{} not granted, call-state listening disabled", Permission::ReadPhoneState);
            return false;
        }

        self.session.lock().reset();
        *self.callback.lock() = Some(callback);

        let relay = Arc::new(CallStateRelay {
            inner: Arc::downgrade(self),
        });
        match self.backend.register(self.telephony.as_ref(), relay) {
            Ok(handle) => {
                *registration = Some(handle);
                info!("Call-state listener registered ({:?})", self.backend);
                true
            }
            Err(e) => {
                warn!("Failed to register call-state listener: {}", e);
                *self.callback.lock() = None;
                false
            }
        }
    }

    fn cleanup(&self) {
        if let Some(handle) = self.registration.lock().take() {
            if let Err(e) = self.telephony.unregister(handle) {
                warn!("Failed to unregister call-state listener: {}", e);
            }
            info!("Call-state listener unregistered");
        }

        // a call in progress can no longer end through the OS, so the
        // subscriber sees it end here
        let callback = self.callback.lock().take();
        let mut session = self.session.lock();
        let from = session.state();
        session.reset();
        if from != CallState::Idle {
            if let Some(callback) = callback {
                debug!("Listener stopped during a {} call, reporting idle", from);
                callback(CallTransition {
                    from,
                    to: CallState::Idle,
                });
            }
        }
    }

    fn on_raw_call_state(&self, code: i32) {
        let Some(callback) = self.callback.lock().clone() else {
            trace!("Dropping call state {} reported while not listening", code);
            return;
        };

        let mut session = self.session.lock();
        match session.apply_raw(code) {
            CallStateUpdate::Transition(transition) => {
                debug!("Call state {} -> {}", transition.from, transition.to);
                self.events.emit(BridgeEvent::CallStateChanged {
                    label: transition.label(self.format),
                });
                callback(transition);

                if transition.is_call_ended() {
                    self.bring_app_to_foreground();
                }
            }
            CallStateUpdate::Duplicate(state) => trace!("Call state {} re-reported", state),
            CallStateUpdate::Rejected { from, to } => {
                warn!("Ignoring call state change {} -> {}", from, to);
            }
            CallStateUpdate::Unknown(code) => {
                warn!("Unknown raw call state {}", code);
                self.events.emit(BridgeEvent::CallStateChanged {
                    label: CallStateLabel::Unknown,
                });
            }
        }
    }

    fn bring_app_to_foreground(&self) {
        let launcher = self.launcher.clone();
        self.dispatcher.dispatch(Box::new(move || {
            if let Err(e) = launcher.bring_to_foreground() {
                warn!("Failed to bring app to foreground: {}", e);
            }
        }));
    }
}

/// Sink handed to the OS. Holds the listener weakly so a leaked OS
/// registration does not keep the listener alive.
struct CallStateRelay {
    inner: Weak<ListenerInner>,
}

impl CallStateSink for CallStateRelay {
    fn on_raw_call_state(&self, code: i32) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_raw_call_state(code);
        }
    }
}

/// Telephony call-state listener
pub struct CallStateListener {
    inner: Arc<ListenerInner>,
    init_timer: TimerSlot,
}

impl CallStateListener {
    pub fn new(
        platform: &PlatformServices,
        events: EventEmitter,
        format: CallStateEventFormat,
        runtime: Handle,
    ) -> Self {
        let backend = TelephonyBackend::detect(platform.telephony.as_ref());
        Self {
            inner: Arc::new(ListenerInner {
                telephony: platform.telephony.clone(),
                permissions: platform.permissions.clone(),
                launcher: platform.launcher.clone(),
                dispatcher: platform.dispatcher.clone(),
                events,
                format,
                backend,
                registration: Mutex::new(None),
                callback: Mutex::new(None),
                session: Mutex::new(CallSession::new()),
            }),
            init_timer: TimerSlot::new("call-listener-init", runtime),
        }
    }

    /// Register with the telephony service.
    ///
    /// Returns `false` when `READ_PHONE_STATE` is missing or registration
    /// fails; the listener then stays disabled.
    pub fn initialize(&self, on_state_changed: CallStateCallback) -> bool {
        self.inner.initialize(on_state_changed)
    }

    /// Initialize once `delay` has passed.
    ///
    /// A zero delay initializes immediately and returns its result;
    /// otherwise returns `true` once the initialization is scheduled.
    pub fn initialize_after(&self, delay: Duration, on_state_changed: CallStateCallback) -> bool {
        if delay.is_zero() {
            return self.initialize(on_state_changed);
        }
        let inner = Arc::downgrade(&self.inner);
        self.init_timer.restart(delay, move || {
            if let Some(inner) = inner.upgrade() {
                inner.initialize(on_state_changed);
            }
        });
        debug!("Call-state listener initialization scheduled in {:?}", delay);
        true
    }

    /// Unregister and cancel a pending delayed initialization
    pub fn cleanup(&self) {
        if self.init_timer.cancel() {
            debug!("Pending call-state listener initialization cancelled");
        }
        self.inner.cleanup();
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.registration.lock().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.init_timer.is_pending()
    }

    pub fn state(&self) -> CallState {
        self.inner.session.lock().state()
    }

    pub fn backend(&self) -> TelephonyBackend {
        self.inner.backend
    }
}

impl Drop for CallStateListener {
    fn drop(&mut self) {
        self.inner.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockPlatform, PlatformCall};
    use crate::telephony::state::raw_call_state;
    use tokio::sync::broadcast;

    fn setup(format: CallStateEventFormat) -> (Arc<MockPlatform>, CallStateListener, broadcast::Receiver<BridgeEvent>) {
        let platform = Arc::new(MockPlatform::new());
        let events = EventEmitter::new(16);
        let rx = events.subscribe_receiver();
        let listener = CallStateListener::new(&platform.services(), events, format, Handle::current());
        (platform, listener, rx)
    }

    fn recorder() -> (Arc<Mutex<Vec<CallTransition>>>, CallStateCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: CallStateCallback = Arc::new(move |t| sink.lock().push(t));
        (seen, callback)
    }

    fn drain(rx: &mut broadcast::Receiver<BridgeEvent>) -> Vec<CallStateLabel> {
        let mut labels = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BridgeEvent::CallStateChanged { label } = event {
                labels.push(label);
            }
        }
        labels
    }

    #[tokio::test]
    async fn test_ringing_active_idle_sequence() {
        let (platform, listener, mut rx) = setup(CallStateEventFormat::Normalized);
        let (seen, callback) = recorder();
        assert!(listener.initialize(callback));

        platform.emit_call_state(raw_call_state::RINGING);
        platform.emit_call_state(raw_call_state::OFFHOOK);
        platform.emit_call_state(raw_call_state::IDLE);

        assert_eq!(
            drain(&mut rx),
            vec![CallStateLabel::OnRinging, CallStateLabel::OnOffhook, CallStateLabel::OnEndCall]
        );
        let states: Vec<_> = seen.lock().iter().map(|t| t.to).collect();
        assert_eq!(states, vec![CallState::Ringing, CallState::Active, CallState::Idle]);
        assert_eq!(platform.count_calls(|c| matches!(c, PlatformCall::BringToForeground)), 1);
    }

    #[tokio::test]
    async fn test_legacy_labels() {
        let (platform, listener, mut rx) = setup(CallStateEventFormat::Legacy);
        let (_, callback) = recorder();
        listener.initialize(callback);

        platform.emit_call_state(raw_call_state::OFFHOOK);
        platform.emit_call_state(raw_call_state::IDLE);
        platform.emit_call_state(42);

        assert_eq!(
            drain(&mut rx),
            vec![CallStateLabel::Offhook, CallStateLabel::Idle, CallStateLabel::Unknown]
        );
    }

    #[tokio::test]
    async fn test_initialize_and_cleanup_are_idempotent() {
        let (platform, listener, _rx) = setup(CallStateEventFormat::Normalized);

        let (_, first) = recorder();
        let (_, second) = recorder();
        assert!(listener.initialize(first));
        assert!(listener.initialize(second));
        assert_eq!(platform.telephony_listener_count(), 1);
        assert_eq!(platform.count_calls(|c| matches!(c, PlatformCall::RegisterTelephonyCallback(_))), 1);

        listener.cleanup();
        listener.cleanup();
        assert!(!listener.is_initialized());
        assert_eq!(platform.telephony_listener_count(), 0);
        assert_eq!(platform.count_calls(|c| matches!(c, PlatformCall::UnregisterTelephony(_))), 1);
    }

    #[tokio::test]
    async fn test_missing_permission_disables_listener() {
        let (platform, listener, _rx) = setup(CallStateEventFormat::Normalized);
        platform.revoke(Permission::ReadPhoneState);

        let (_, callback) = recorder();
        assert!(!listener.initialize(callback));
        assert!(!listener.is_initialized());
        assert_eq!(platform.telephony_listener_count(), 0);
    }

    #[tokio::test]
    async fn test_legacy_backend_selected() {
        let platform = Arc::new(MockPlatform::new());
        platform.set_supports_telephony_callback(false);
        let listener = CallStateListener::new(
            &platform.services(),
            EventEmitter::new(4),
            CallStateEventFormat::Normalized,
            Handle::current(),
        );
        assert_eq!(listener.backend(), TelephonyBackend::PhoneStateListener);

        let (_, callback) = recorder();
        listener.initialize(callback);
        assert_eq!(platform.count_calls(|c| matches!(c, PlatformCall::ListenCallState(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_cancels_delayed_initialization() {
        let (platform, listener, _rx) = setup(CallStateEventFormat::Normalized);
        let (_, callback) = recorder();

        assert!(listener.initialize_after(Duration::from_millis(500), callback));
        assert!(listener.is_pending());
        listener.cleanup();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!listener.is_initialized());
        assert_eq!(platform.telephony_listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_initialization_fires() {
        let (platform, listener, _rx) = setup(CallStateEventFormat::Normalized);
        let (_, callback) = recorder();

        listener.initialize_after(Duration::from_millis(500), callback);
        assert!(!listener.is_initialized());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(listener.is_initialized());
        assert_eq!(platform.telephony_listener_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_mid_call_reports_idle() {
        let (platform, listener, mut rx) = setup(CallStateEventFormat::Normalized);
        let (seen, callback) = recorder();
        listener.initialize(callback);
        platform.emit_call_state(raw_call_state::RINGING);
        drain(&mut rx);

        listener.cleanup();
        listener.cleanup();

        let transitions = seen.lock().clone();
        assert_eq!(
            transitions.last(),
            Some(&CallTransition {
                from: CallState::Ringing,
                to: CallState::Idle,
            })
        );
        assert_eq!(transitions.len(), 2);
        assert_eq!(listener.state(), CallState::Idle);
        // internal bookkeeping only: no outward event, no relaunch
        assert!(drain(&mut rx).is_empty());
        assert_eq!(platform.count_calls(|c| matches!(c, PlatformCall::BringToForeground)), 0);
    }

    #[tokio::test]
    async fn test_reports_after_cleanup_are_dropped() {
        let (platform, listener, mut rx) = setup(CallStateEventFormat::Normalized);
        let (seen, callback) = recorder();
        listener.initialize(callback);
        listener.cleanup();

        // a sink that leaked out of the OS registration
        let relay = CallStateRelay {
            inner: Arc::downgrade(&listener.inner),
        };
        relay.on_raw_call_state(raw_call_state::RINGING);
        platform.emit_call_state(raw_call_state::RINGING);

        assert!(seen.lock().is_empty());
        assert!(drain(&mut rx).is_empty());
    }
}
