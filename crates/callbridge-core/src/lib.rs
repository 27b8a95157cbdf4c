//! # CallBridge Core - Call Audio Routing & Session Lifecycle
//!
//! Coordinates the OS audio stack and the app lifecycle for a mobile
//! voice/video calling app:
//! - **audio**: device catalog, priority policy with hysteresis, audio
//!   focus, debounced device-change handling and output routing
//! - **telephony**: call-state listening for interruptions by regular
//!   phone calls
//! - **session**: foreground service, ongoing-call notification,
//!   picture-in-picture and screen wake
//!
//! Every OS service is reached through the capability traits in
//! [`platform`]; [`platform::mock::MockPlatform`] implements all of them in
//! memory.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use callbridge_core::platform::mock::MockPlatform;
//! use callbridge_core::{BridgeConfig, CallBridge, DeviceGroupKind};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> callbridge_core::CallBridgeResult<()> {
//!     let platform = Arc::new(MockPlatform::phone());
//!     let bridge = CallBridge::new(BridgeConfig::default(), platform.services())?;
//!
//!     // First pass of a call prefers the speaker over the earpiece
//!     bridge.init_audio_devices();
//!     assert_eq!(bridge.routing_decision().group, Some(DeviceGroupKind::Speaker));
//!
//!     assert!(bridge.request_audio_focus());
//!     bridge.update_ui_state(true, true, Some("Daily standup".to_string()), false);
//!
//!     bridge.shutdown();
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod platform;
pub mod session;
pub mod telephony;
pub mod timer;

// Re-export main types
pub use audio::{AudioEndpoint, DeviceGroupKind, DeviceId, RoutingDecision, RoutingStrategy};
pub use bridge::{CallBridge, CallBridgeBuilder};
pub use config::BridgeConfig;
pub use error::{CallBridgeError, CallBridgeResult};
pub use events::{BridgeEvent, CallStateEventFormat, CallStateLabel, EventStream};
pub use platform::PlatformServices;
pub use session::{SessionAction, UiSessionState};
pub use telephony::{CallState, TelephonyBackend};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
