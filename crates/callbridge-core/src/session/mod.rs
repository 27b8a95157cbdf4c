//! Session lifecycle
//!
//! Foreground service, ongoing-call notification, picture-in-picture and
//! screen wake, all driven from one session state.

pub mod notification;
pub mod orchestrator;
pub mod pip;
pub mod state;

pub use notification::{build_notification, NotificationButton, NotificationContent, SessionAction};
pub use orchestrator::SessionOrchestrator;
pub use pip::{build_pip_params, AspectRatio, PipParams, Rect, RemoteAction};
pub use state::{SessionStateHandle, UiSessionState};
