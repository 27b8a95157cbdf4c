//! Outward events delivered to the application layer
//!
//! Every event has a stable wire name (`name()`) and a JSON payload
//! (`payload()`) that the host forwards to the scripted application layer
//! unchanged.
//!
//! ```rust
//! use callbridge_core::events::{BridgeEvent, EventEmitter};
//!
//! let emitter = EventEmitter::new(16);
//! let mut rx = emitter.subscribe_receiver();
//!
//! emitter.emit(BridgeEvent::PermissionsStatus { all_granted: true });
//!
//! let event = rx.try_recv().unwrap();
//! assert_eq!(event.name(), "permissionsStatus");
//! assert_eq!(event.payload()["allGranted"], true);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::audio::device::DeviceId;
use crate::audio::policy::DeviceGroupKind;
use crate::session::notification::SessionAction;

/// Which generation of call-state labels is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStateEventFormat {
    /// RINGING / OFFHOOK / IDLE / UNKNOWN
    Legacy,
    /// ON_RINGING / ON_OFFHOOK / ON_START_CALL / ON_END_CALL / UNKNOWN
    #[default]
    Normalized,
}

/// Label carried by an `onCallStateChanged` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStateLabel {
    Ringing,
    Offhook,
    Idle,
    OnStartCall,
    OnEndCall,
    OnRinging,
    OnOffhook,
    Unknown,
}

impl CallStateLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStateLabel::Ringing => "RINGING",
            CallStateLabel::Offhook => "OFFHOOK",
            CallStateLabel::Idle => "IDLE",
            CallStateLabel::OnStartCall => "ON_START_CALL",
            CallStateLabel::OnEndCall => "ON_END_CALL",
            CallStateLabel::OnRinging => "ON_RINGING",
            CallStateLabel::OnOffhook => "ON_OFFHOOK",
            CallStateLabel::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for CallStateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One visible endpoint in a routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Group the endpoint was classified into
    pub group: DeviceGroupKind,
    /// Human-readable hardware type name
    pub type_name: String,
    /// Selection priority of the group
    pub priority: u8,
    /// OS-assigned endpoint id
    pub id: DeviceId,
    /// Whether this endpoint carries voice audio now
    pub active: bool,
}

/// Events emitted by the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// New routing table after a routing pass
    UpdateAudioDevice {
        /// One entry per visible endpoint, in enumeration order
        routes: Vec<RouteEntry>,
    },

    /// Telephony call state changed
    CallStateChanged { label: CallStateLabel },

    /// OS audio-focus change (legacy focus listener path)
    AudioFocusChanged { event_code: i32 },

    /// Result of a permission sweep
    PermissionsStatus { all_granted: bool },

    /// A notification or PiP button was pressed
    NotificationAction { action: SessionAction },
}

impl BridgeEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::UpdateAudioDevice { .. } => "updateAudioDevice",
            BridgeEvent::CallStateChanged { .. } => "onCallStateChanged",
            BridgeEvent::AudioFocusChanged { .. } => "onAudioFocusChange",
            BridgeEvent::PermissionsStatus { .. } => "permissionsStatus",
            BridgeEvent::NotificationAction { .. } => "onNotificationAction",
        }
    }

    /// JSON payload of the event
    pub fn payload(&self) -> Value {
        match self {
            BridgeEvent::UpdateAudioDevice { routes } => routes_payload(routes),
            BridgeEvent::CallStateChanged { label } => json!({ "state": label.as_str() }),
            BridgeEvent::AudioFocusChanged { event_code } => json!({ "eventCode": event_code }),
            BridgeEvent::PermissionsStatus { all_granted } => json!({ "allGranted": all_granted }),
            BridgeEvent::NotificationAction { action } => json!({ "action": action.as_str() }),
        }
    }
}

/// Routing table keyed by group name. Within a group the active endpoint
/// owns the key, otherwise the first enumerated one does.
fn routes_payload(routes: &[RouteEntry]) -> Value {
    let mut map = Map::new();
    for route in routes {
        let key = route.group.name();
        let replace = match map.get(key) {
            None => true,
            Some(existing) => route.active && existing["active"] != Value::Bool(true),
        };
        if replace {
            map.insert(
                key.to_string(),
                json!({
                    "type": route.type_name,
                    "priority": route.priority,
                    "id": route.id.0,
                    "active": route.active,
                }),
            );
        }
    }
    Value::Object(map)
}

/// Event stream type
pub type EventStream = BroadcastStream<BridgeEvent>;

/// Fan-out of bridge events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: BridgeEvent) {
        tracing::debug!("Emitting {} {}", event.name(), event.payload());
        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Subscribe to events as a stream
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Subscribe to events with a plain receiver
    pub fn subscribe_receiver(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}
