//! Ongoing-call notification
//!
//! The notification mirrors the current session flags and carries action
//! buttons. Each button is wired to a broadcast action string
//! (`<action_prefix>.<ACTION>`) that the host's broadcast receiver hands
//! back to the bridge.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::UiSessionState;
use crate::config::NotificationConfig;
use crate::telephony::CallState;

/// Button actions exposed by the notification and the PiP window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionAction {
    JoinRoom,
    LeaveRoom,
    MuteMic,
    UnmuteMic,
    ToggleCamera,
}

impl SessionAction {
    pub const ALL: [SessionAction; 5] = [
        SessionAction::JoinRoom,
        SessionAction::LeaveRoom,
        SessionAction::MuteMic,
        SessionAction::UnmuteMic,
        SessionAction::ToggleCamera,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionAction::JoinRoom => "JOIN_ROOM",
            SessionAction::LeaveRoom => "LEAVE_ROOM",
            SessionAction::MuteMic => "MUTE_MIC",
            SessionAction::UnmuteMic => "UNMUTE_MIC",
            SessionAction::ToggleCamera => "TOGGLE_CAMERA",
        }
    }

    /// Broadcast action string for this button
    pub fn broadcast_action(&self, prefix: &str) -> String {
        format!("{}.{}", prefix, self.as_str())
    }

    /// Parse a broadcast action string back into an action
    pub fn from_broadcast(action: &str, prefix: &str) -> Option<Self> {
        let name = action.strip_prefix(prefix)?.strip_prefix('.')?;
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == name)
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationButton {
    pub action: SessionAction,
    pub label: String,
    /// Broadcast action delivered when pressed
    pub broadcast: String,
}

/// Rendered notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    pub channel_id: String,
    /// Shown in system settings; hosts create the channel with it
    pub channel_name: String,
    pub notification_id: i32,
    pub title: String,
    pub text: String,
    /// Not dismissible by the user
    pub ongoing: bool,
    pub actions: Vec<NotificationButton>,
}

/// Render the notification for the current state
pub fn build_notification(
    ui: &UiSessionState,
    call_state: CallState,
    config: &NotificationConfig,
) -> NotificationContent {
    NotificationContent {
        channel_id: config.channel_id.clone(),
        channel_name: config.channel_name.clone(),
        notification_id: config.notification_id,
        title: config.title.clone(),
        text: notification_text(ui, call_state),
        ongoing: true,
        actions: notification_actions(ui)
            .into_iter()
            .map(|(action, label)| NotificationButton {
                action,
                label: label.to_string(),
                broadcast: action.broadcast_action(&config.action_prefix),
            })
            .collect(),
    }
}

fn notification_text(ui: &UiSessionState, call_state: CallState) -> String {
    if call_state != CallState::Idle {
        return "Paused for a phone call".to_string();
    }

    let mic = if ui.mic_on { "mic on" } else { "mic muted" };
    if ui.in_room {
        let camera = if ui.cam_muted { "camera off" } else { "camera on" };
        match &ui.room {
            Some(room) => format!("In {}: {}, {}", room, mic, camera),
            None => format!("In room: {}, {}", mic, camera),
        }
    } else {
        format!("Not in a room: {}", mic)
    }
}

pub(crate) fn notification_actions(ui: &UiSessionState) -> Vec<(SessionAction, &'static str)> {
    let mut actions = Vec::with_capacity(3);
    if ui.in_room {
        actions.push((SessionAction::LeaveRoom, "Leave"));
    } else {
        actions.push((SessionAction::JoinRoom, "Join"));
    }
    if ui.mic_on {
        actions.push((SessionAction::MuteMic, "Mute"));
    } else {
        actions.push((SessionAction::UnmuteMic, "Unmute"));
    }
    if ui.in_room {
        let label = if ui.cam_muted { "Camera on" } else { "Camera off" };
        actions.push((SessionAction::ToggleCamera, label));
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_room(mic_on: bool) -> UiSessionState {
        UiSessionState {
            mic_on,
            in_room: true,
            cam_muted: true,
            room: Some("Lobby".to_string()),
            is_app_foreground: false,
        }
    }

    #[test]
    fn test_notification_reflects_flags() {
        let content = build_notification(&in_room(true), CallState::Idle, &NotificationConfig::default());

        assert_eq!(content.text, "In Lobby: mic on, camera off");
        assert_eq!(content.channel_id, "ongoing_call");
        assert_eq!(content.channel_name, "Ongoing call");
        assert!(content.ongoing);
        let actions: Vec<_> = content.actions.iter().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![SessionAction::LeaveRoom, SessionAction::MuteMic, SessionAction::ToggleCamera]
        );
        assert_eq!(content.actions[1].broadcast, "callbridge.action.MUTE_MIC");
    }

    #[test]
    fn test_outside_room_offers_join() {
        let ui = UiSessionState {
            mic_on: false,
            ..UiSessionState::default()
        };
        let content = build_notification(&ui, CallState::Idle, &NotificationConfig::default());

        assert_eq!(content.text, "Not in a room: mic muted");
        let actions: Vec<_> = content.actions.iter().map(|a| a.action).collect();
        assert_eq!(actions, vec![SessionAction::JoinRoom, SessionAction::UnmuteMic]);
    }

    #[test]
    fn test_phone_call_pauses_session_text() {
        let content = build_notification(&in_room(true), CallState::Ringing, &NotificationConfig::default());
        assert_eq!(content.text, "Paused for a phone call");
    }

    #[test]
    fn test_broadcast_action_parsing() {
        let prefix = "app.call";
        for action in SessionAction::ALL {
            let broadcast = action.broadcast_action(prefix);
            assert_eq!(SessionAction::from_broadcast(&broadcast, prefix), Some(action));
        }
        assert_eq!(SessionAction::from_broadcast("app.call.DANCE", prefix), None);
        assert_eq!(SessionAction::from_broadcast("other.MUTE_MIC", prefix), None);
    }
}
