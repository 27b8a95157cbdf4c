//! Call session state machine
//!
//! `IDLE -> RINGING -> ACTIVE -> IDLE`, plus `IDLE -> ACTIVE` for outgoing
//! calls. Raw telephony codes are mapped here and never leave the module.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CallBridgeError, CallBridgeResult};
use crate::events::{CallStateEventFormat, CallStateLabel};

/// Raw call-state codes reported by the telephony service
pub mod raw_call_state {
    pub const IDLE: i32 = 0;
    pub const RINGING: i32 = 1;
    pub const OFFHOOK: i32 = 2;
}

/// Telephony call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    #[default]
    Idle,
    Ringing,
    Active,
}

impl CallState {
    pub fn from_raw(code: i32) -> Option<Self> {
        match code {
            raw_call_state::IDLE => Some(CallState::Idle),
            raw_call_state::RINGING => Some(CallState::Ringing),
            raw_call_state::OFFHOOK => Some(CallState::Active),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "IDLE",
            CallState::Ringing => "RINGING",
            CallState::Active => "ACTIVE",
        }
    }

    /// Whether the transition to `to` is a legal edge
    pub fn can_transition_to(&self, to: CallState) -> bool {
        !matches!((self, to), (CallState::Active, CallState::Ringing))
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTransition {
    pub from: CallState,
    pub to: CallState,
}

impl CallTransition {
    /// Event label of this transition
    pub fn label(&self, format: CallStateEventFormat) -> CallStateLabel {
        match format {
            CallStateEventFormat::Legacy => match self.to {
                CallState::Ringing => CallStateLabel::Ringing,
                CallState::Active => CallStateLabel::Offhook,
                CallState::Idle => CallStateLabel::Idle,
            },
            CallStateEventFormat::Normalized => match (self.from, self.to) {
                (_, CallState::Ringing) => CallStateLabel::OnRinging,
                (CallState::Ringing, CallState::Active) => CallStateLabel::OnOffhook,
                (_, CallState::Active) => CallStateLabel::OnStartCall,
                (_, CallState::Idle) => CallStateLabel::OnEndCall,
            },
        }
    }

    /// A phone call just finished
    pub fn is_call_ended(&self) -> bool {
        self.to == CallState::Idle && self.from != CallState::Idle
    }
}

/// Outcome of feeding a raw code to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStateUpdate {
    Transition(CallTransition),
    /// Re-report of the current state
    Duplicate(CallState),
    /// Illegal edge, state unchanged
    Rejected { from: CallState, to: CallState },
    /// Code outside the known set, state unchanged
    Unknown(i32),
}

/// Current telephony call state, starting at IDLE
#[derive(Debug, Clone, Default)]
pub struct CallSession {
    state: CallState,
}

impl CallSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Move to `to`. Returns `None` when already there.
    pub fn transition(&mut self, to: CallState) -> CallBridgeResult<Option<CallTransition>> {
        let from = self.state;
        if from == to {
            return Ok(None);
        }
        if !from.can_transition_to(to) {
            return Err(CallBridgeError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(Some(CallTransition { from, to }))
    }

    /// Apply a raw telephony code
    pub fn apply_raw(&mut self, code: i32) -> CallStateUpdate {
        let Some(to) = CallState::from_raw(code) else {
            return CallStateUpdate::Unknown(code);
        };
        match self.transition(to) {
            Ok(Some(transition)) => CallStateUpdate::Transition(transition),
            Ok(None) => CallStateUpdate::Duplicate(to),
            Err(_) => CallStateUpdate::Rejected { from: self.state, to },
        }
    }

    pub fn reset(&mut self) {
        self.state = CallState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CallStateEventFormat::{Legacy, Normalized};

    fn labels(codes: &[i32], format: CallStateEventFormat) -> Vec<CallStateLabel> {
        let mut session = CallSession::new();
        codes
            .iter()
            .filter_map(|code| match session.apply_raw(*code) {
                CallStateUpdate::Transition(t) => Some(t.label(format)),
                CallStateUpdate::Unknown(_) => Some(CallStateLabel::Unknown),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_incoming_call_labels() {
        let codes = [raw_call_state::RINGING, raw_call_state::OFFHOOK, raw_call_state::IDLE];
        assert_eq!(
            labels(&codes, Normalized),
            vec![CallStateLabel::OnRinging, CallStateLabel::OnOffhook, CallStateLabel::OnEndCall]
        );
        assert_eq!(
            labels(&codes, Legacy),
            vec![CallStateLabel::Ringing, CallStateLabel::Offhook, CallStateLabel::Idle]
        );
    }

    #[test]
    fn test_outgoing_call_labels() {
        let codes = [raw_call_state::OFFHOOK, raw_call_state::IDLE];
        assert_eq!(
            labels(&codes, Normalized),
            vec![CallStateLabel::OnStartCall, CallStateLabel::OnEndCall]
        );
    }

    #[test]
    fn test_missed_call_ends_from_ringing() {
        let mut session = CallSession::new();
        session.apply_raw(raw_call_state::RINGING);
        let update = session.apply_raw(raw_call_state::IDLE);
        match update {
            CallStateUpdate::Transition(t) => assert!(t.is_call_ended()),
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_report_is_not_a_transition() {
        let mut session = CallSession::new();
        assert_eq!(
            session.apply_raw(raw_call_state::IDLE),
            CallStateUpdate::Duplicate(CallState::Idle)
        );
    }

    #[test]
    fn test_ringing_during_active_call_is_rejected() {
        let mut session = CallSession::new();
        session.apply_raw(raw_call_state::OFFHOOK);

        assert_eq!(
            session.apply_raw(raw_call_state::RINGING),
            CallStateUpdate::Rejected {
                from: CallState::Active,
                to: CallState::Ringing
            }
        );
        assert_eq!(session.state(), CallState::Active);
        assert!(session.transition(CallState::Ringing).is_err());
    }

    #[test]
    fn test_unknown_code_leaves_state() {
        let mut session = CallSession::new();
        session.apply_raw(raw_call_state::RINGING);

        assert_eq!(session.apply_raw(7), CallStateUpdate::Unknown(7));
        assert_eq!(session.state(), CallState::Ringing);
    }
}
