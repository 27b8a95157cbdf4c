//! UI session state
//!
//! One owned struct replaces the mic/room/camera flags that the
//! notification builder, the PiP builder and the orchestrator all read.
//! The orchestrator is the only writer; everyone else gets a
//! [`SessionStateHandle`] and reads snapshots.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Flags of the in-app session, as last reported by the application layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSessionState {
    pub mic_on: bool,
    pub in_room: bool,
    pub cam_muted: bool,
    /// Display label of the current room
    pub room: Option<String>,
    /// Last confirmed process visibility
    pub is_app_foreground: bool,
}

impl Default for UiSessionState {
    fn default() -> Self {
        Self {
            mic_on: false,
            in_room: false,
            cam_muted: true,
            room: None,
            is_app_foreground: true,
        }
    }
}

impl UiSessionState {
    /// A session is active while the user is in a room or talking
    pub fn is_session_active(&self) -> bool {
        self.in_room || self.mic_on
    }

    /// Screen wake follows foreground visibility and session activity
    pub fn wants_screen_on(&self) -> bool {
        self.is_app_foreground && self.is_session_active()
    }

    /// Copy of this state with the application-layer flags replaced
    pub fn with_flags(&self, mic_on: bool, in_room: bool, room: Option<String>, cam_muted: bool) -> Self {
        Self {
            mic_on,
            in_room,
            cam_muted,
            room,
            is_app_foreground: self.is_app_foreground,
        }
    }
}

/// Read-only shared view of the session state
#[derive(Debug, Clone, Default)]
pub struct SessionStateHandle {
    inner: Arc<RwLock<UiSessionState>>,
}

impl SessionStateHandle {
    pub fn new(state: UiSessionState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn snapshot(&self) -> UiSessionState {
        self.inner.read().clone()
    }

    pub fn is_session_active(&self) -> bool {
        self.inner.read().is_session_active()
    }

    pub(crate) fn publish(&self, state: &UiSessionState) {
        *self.inner.write() = state.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_activity() {
        let mut state = UiSessionState::default();
        assert!(!state.is_session_active());
        assert!(!state.wants_screen_on());

        state.in_room = true;
        assert!(state.is_session_active());
        assert!(state.wants_screen_on());

        state.is_app_foreground = false;
        assert!(!state.wants_screen_on());
    }

    #[test]
    fn test_with_flags_keeps_visibility() {
        let mut state = UiSessionState::default();
        state.is_app_foreground = false;

        let next = state.with_flags(true, true, Some("Lobby".to_string()), false);
        assert!(!next.is_app_foreground);
        assert_eq!(next.room.as_deref(), Some("Lobby"));
    }

    #[test]
    fn test_handle_sees_published_state() {
        let handle = SessionStateHandle::default();
        let reader = handle.clone();

        let mut state = UiSessionState::default();
        state.mic_on = true;
        handle.publish(&state);

        assert!(reader.snapshot().mic_on);
        assert!(reader.is_session_active());
    }
}
