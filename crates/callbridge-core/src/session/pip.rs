//! Picture-in-picture parameters

use serde::Serialize;

use super::notification::{notification_actions, SessionAction};
use super::state::UiSessionState;
use crate::config::PipConfig;

/// Window rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

/// Button shown in the PiP window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteAction {
    pub action: SessionAction,
    pub title: String,
    pub broadcast: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipParams {
    pub aspect_ratio: AspectRatio,
    /// Bounds of the video surface the window animates from
    pub source_rect: Option<Rect>,
    pub actions: Vec<RemoteAction>,
}

/// Build PiP parameters for the current state.
///
/// The action set matches the notification buttons. An empty source rect
/// is dropped.
pub fn build_pip_params(
    ui: &UiSessionState,
    source_rect: Option<Rect>,
    config: &PipConfig,
    action_prefix: &str,
) -> PipParams {
    PipParams {
        aspect_ratio: AspectRatio {
            width: config.aspect_width,
            height: config.aspect_height,
        },
        source_rect: source_rect.filter(|rect| !rect.is_empty()),
        actions: notification_actions(ui)
            .into_iter()
            .map(|(action, title)| RemoteAction {
                action,
                title: title.to_string(),
                broadcast: action.broadcast_action(action_prefix),
            })
            .collect(),
    }
}
