//! Telephony call-state tracking

pub mod listener;
pub mod state;

pub use listener::{CallStateCallback, CallStateListener, TelephonyBackend};
pub use state::{CallSession, CallState, CallStateUpdate, CallTransition};
