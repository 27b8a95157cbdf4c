//! Audio endpoints as reported by the OS
//!
//! Raw type codes use the Android `AudioDeviceInfo.TYPE_*` numbering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// OS-assigned endpoint identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw hardware type codes
pub mod raw_type {
    pub const UNKNOWN: i32 = 0;
    pub const BUILTIN_EARPIECE: i32 = 1;
    pub const BUILTIN_SPEAKER: i32 = 2;
    pub const WIRED_HEADSET: i32 = 3;
    pub const WIRED_HEADPHONES: i32 = 4;
    pub const LINE_ANALOG: i32 = 5;
    pub const LINE_DIGITAL: i32 = 6;
    pub const BLUETOOTH_SCO: i32 = 7;
    pub const BLUETOOTH_A2DP: i32 = 8;
    pub const HDMI: i32 = 9;
    pub const USB_DEVICE: i32 = 11;
    pub const USB_ACCESSORY: i32 = 12;
    pub const DOCK: i32 = 13;
    pub const TELEPHONY: i32 = 18;
    pub const USB_HEADSET: i32 = 22;
    pub const HEARING_AID: i32 = 23;
    pub const BUILTIN_SPEAKER_SAFE: i32 = 24;
    pub const BLE_HEADSET: i32 = 26;
    pub const BLE_SPEAKER: i32 = 27;
}

/// Human-readable name of a raw type code
pub fn type_name(raw: i32) -> String {
    let name = match raw {
        raw_type::UNKNOWN => "UNKNOWN",
        raw_type::BUILTIN_EARPIECE => "BUILTIN_EARPIECE",
        raw_type::BUILTIN_SPEAKER => "BUILTIN_SPEAKER",
        raw_type::WIRED_HEADSET => "WIRED_HEADSET",
        raw_type::WIRED_HEADPHONES => "WIRED_HEADPHONES",
        raw_type::LINE_ANALOG => "LINE_ANALOG",
        raw_type::LINE_DIGITAL => "LINE_DIGITAL",
        raw_type::BLUETOOTH_SCO => "BLUETOOTH_SCO",
        raw_type::BLUETOOTH_A2DP => "BLUETOOTH_A2DP",
        raw_type::HDMI => "HDMI",
        raw_type::USB_DEVICE => "USB_DEVICE",
        raw_type::USB_ACCESSORY => "USB_ACCESSORY",
        raw_type::DOCK => "DOCK",
        raw_type::TELEPHONY => "TELEPHONY",
        raw_type::USB_HEADSET => "USB_HEADSET",
        raw_type::HEARING_AID => "HEARING_AID",
        raw_type::BUILTIN_SPEAKER_SAFE => "BUILTIN_SPEAKER_SAFE",
        raw_type::BLE_HEADSET => "BLE_HEADSET",
        raw_type::BLE_SPEAKER => "BLE_SPEAKER",
        other => return format!("TYPE_UNKNOWN_{}", other),
    };
    format!("TYPE_{}", name)
}

/// An attached audio endpoint.
///
/// Lives only as long as the OS reports the device attached; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEndpoint {
    /// OS-assigned identifier
    pub id: DeviceId,
    /// Raw hardware type code
    pub raw_type: i32,
    /// Human-readable type name
    pub type_name: String,
}

impl AudioEndpoint {
    /// Create an endpoint, deriving the type name from the raw code
    pub fn new(id: i32, raw_type: i32) -> Self {
        Self {
            id: DeviceId(id),
            raw_type,
            type_name: type_name(raw_type),
        }
    }

    /// Whether the endpoint is a telephony-only path, never a voice output
    pub fn is_telephony(&self) -> bool {
        self.raw_type == raw_type::TELEPHONY
    }
}

impl fmt::Display for AudioEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}
