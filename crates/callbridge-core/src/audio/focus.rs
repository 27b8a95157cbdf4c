//! Audio focus controller
//!
//! Owns the single OS focus-request handle of the process. `has_focus` is
//! true only between a successful acquire and the following release, and
//! nothing outside this type changes it.
//!
//! No failure escapes: OS errors are logged and reduced to `false` or a
//! no-op, so a focus problem degrades audio instead of ending the call.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::events::{BridgeEvent, EventEmitter};
use crate::platform::{AudioManager, AudioMode, FocusHandle, FocusRequest, FocusResult};

/// Snapshot of the focus state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FocusState {
    pub has_focus: bool,
    pub handle: Option<FocusHandle>,
}

/// Acquires and releases OS audio focus for voice communication
pub struct AudioFocusController {
    audio: Arc<dyn AudioManager>,
    events: EventEmitter,
    state: Mutex<FocusState>,
}

impl AudioFocusController {
    pub fn new(audio: Arc<dyn AudioManager>, events: EventEmitter) -> Self {
        Self {
            audio,
            events,
            state: Mutex::new(FocusState::default()),
        }
    }

    /// Acquire focus for voice communication.
    ///
    /// Idempotent: returns `true` without touching the OS while focus is held.
    pub fn request_focus(&self) -> bool {
        let mut state = self.state.lock();
        if state.has_focus {
            debug!("Audio focus already held");
            return true;
        }

        if let Err(e) = self.audio.set_mode(AudioMode::InCommunication) {
            warn!("Failed to enter communication mode: {}", e);
            return false;
        }

        let request = FocusRequest::voice_communication();
        match self.audio.request_audio_focus(&request) {
            Ok(FocusResult::Granted(handle)) => {
                state.has_focus = true;
                state.handle = Some(handle);
                info!("Audio focus granted");
                true
            }
            Ok(result) => {
                warn!("Audio focus not granted: {:?}", result);
                self.restore_normal_mode();
                false
            }
            Err(e) => {
                warn!("Audio focus request failed: {}", e);
                self.restore_normal_mode();
                false
            }
        }
    }

    /// Release focus and return the OS audio mode to normal.
    ///
    /// Safe without focus held: only the mode reset reaches the OS. When the
    /// OS refuses the release the handle is kept, so a later call can retry.
    pub fn abandon_focus(&self) {
        let mut state = self.state.lock();
        match state.handle {
            Some(handle) => {
                if let Err(e) = self.audio.abandon_audio_focus(handle) {
                    warn!("Failed to abandon audio focus, keeping handle {:?}: {}", handle, e);
                    return;
                }
                info!("Audio focus abandoned");
            }
            None => debug!("abandon_focus called without focus held"),
        }
        *state = FocusState::default();
        self.restore_normal_mode();
    }

    /// OS focus-change callback (legacy listener path)
    pub fn on_focus_change(&self, event_code: i32) {
        debug!("Audio focus change: {}", event_code);
        self.events.emit(BridgeEvent::AudioFocusChanged { event_code });
    }

    pub fn has_focus(&self) -> bool {
        self.state.lock().has_focus
    }

    pub fn state(&self) -> FocusState {
        *self.state.lock()
    }

    fn restore_normal_mode(&self) {
        if let Err(e) = self.audio.set_mode(AudioMode::Normal) {
            warn!("Failed to restore normal audio mode: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockPlatform, PlatformCall};

    fn controller() -> (Arc<MockPlatform>, AudioFocusController) {
        let platform = Arc::new(MockPlatform::new());
        let controller = AudioFocusController::new(platform.clone(), EventEmitter::new(8));
        (platform, controller)
    }

    #[test]
    fn test_request_is_idempotent() {
        let (platform, controller) = controller();

        assert!(controller.request_focus());
        assert!(controller.request_focus());
        assert!(controller.has_focus());

        let requests = platform
            .calls()
            .into_iter()
            .filter(|c| matches!(c, PlatformCall::RequestAudioFocus))
            .count();
        assert_eq!(requests, 1);
    }

    #[test]
    fn test_abandon_without_focus_only_resets_mode() {
        let (platform, controller) = controller();

        controller.abandon_focus();

        assert_eq!(platform.calls(), vec![PlatformCall::SetMode(AudioMode::Normal)]);
        assert!(!controller.has_focus());
    }

    #[test]
    fn test_abandon_releases_acquired_handle() {
        let (platform, controller) = controller();
        assert!(controller.request_focus());
        let handle = controller.state().handle.unwrap();
        platform.clear_calls();

        controller.abandon_focus();

        assert_eq!(
            platform.calls(),
            vec![
                PlatformCall::AbandonAudioFocus(handle),
                PlatformCall::SetMode(AudioMode::Normal),
            ]
        );
        assert_eq!(controller.state(), FocusState::default());
    }

    #[test]
    fn test_denied_focus_restores_mode() {
        let (platform, controller) = controller();
        platform.set_focus_result(FocusResult::Denied);

        assert!(!controller.request_focus());
        assert!(!controller.has_focus());
        assert_eq!(
            platform.calls(),
            vec![
                PlatformCall::SetMode(AudioMode::InCommunication),
                PlatformCall::RequestAudioFocus,
                PlatformCall::SetMode(AudioMode::Normal),
            ]
        );
    }

    #[test]
    fn test_unavailable_service_is_soft_failure() {
        let (platform, controller) = controller();
        platform.set_audio_unavailable(true);

        assert!(!controller.request_focus());
        controller.abandon_focus();
        assert!(!controller.has_focus());
    }

    #[test]
    fn test_failed_abandon_keeps_handle_for_retry() {
        let (platform, controller) = controller();
        assert!(controller.request_focus());
        let held = controller.state();

        platform.set_audio_unavailable(true);
        controller.abandon_focus();
        assert_eq!(controller.state(), held);
        assert!(controller.has_focus());

        platform.set_audio_unavailable(false);
        platform.clear_calls();
        controller.abandon_focus();

        assert_eq!(
            platform.count_calls(|c| matches!(c, PlatformCall::AbandonAudioFocus(_))),
            1
        );
        assert_eq!(controller.state(), FocusState::default());
        assert_eq!(platform.mode(), AudioMode::Normal);
    }

    #[test]
    fn test_focus_change_is_reported() {
        let platform = Arc::new(MockPlatform::new());
        let events = EventEmitter::new(8);
        let mut rx = events.subscribe_receiver();
        let controller = AudioFocusController::new(platform, events);

        controller.on_focus_change(-2);

        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::AudioFocusChanged { event_code: -2 });
    }
}
