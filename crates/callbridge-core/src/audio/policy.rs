//! Device catalog and routing priority policy
//!
//! Pure functions, no I/O. Endpoints are classified into four groups, each
//! with a fixed priority (higher wins):
//!
//! | Group      | Priority |
//! |------------|----------|
//! | headphones | 4        |
//! | bluetooth  | 3        |
//! | speaker    | 2        |
//! | earpiece   | 1        |
//!
//! After the highest-priority group is picked, two hysteresis corrections
//! are applied based on the group selected by the previous pass:
//!
//! 1. previous = bluetooth and fresh default = speaker → earpiece, so audio
//!    does not flash to the loudspeaker for one tick when Bluetooth drops.
//! 2. fresh default = earpiece on an initializing pass → speaker, so a new
//!    call does not start on the quiet earpiece.
//!
//! Rule 1 is checked first and wins when both apply.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::device::{raw_type, AudioEndpoint};

/// Policy-level category of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceGroupKind {
    Headphones,
    Bluetooth,
    Speaker,
    Earpiece,
}

/// Static description of a device group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceGroup {
    pub kind: DeviceGroupKind,
    pub priority: u8,
    pub raw_types: &'static [i32],
}

/// The catalog, ordered from highest to lowest priority
pub static DEVICE_GROUPS: [DeviceGroup; 4] = [
    DeviceGroup {
        kind: DeviceGroupKind::Headphones,
        priority: 4,
        raw_types: &[
            raw_type::WIRED_HEADSET,
            raw_type::WIRED_HEADPHONES,
            raw_type::USB_DEVICE,
            raw_type::USB_HEADSET,
        ],
    },
    DeviceGroup {
        kind: DeviceGroupKind::Bluetooth,
        priority: 3,
        raw_types: &[
            raw_type::BLUETOOTH_SCO,
            raw_type::BLUETOOTH_A2DP,
            raw_type::HEARING_AID,
            raw_type::BLE_HEADSET,
            raw_type::BLE_SPEAKER,
        ],
    },
    DeviceGroup {
        kind: DeviceGroupKind::Speaker,
        priority: 2,
        raw_types: &[raw_type::BUILTIN_SPEAKER, raw_type::BUILTIN_SPEAKER_SAFE],
    },
    DeviceGroup {
        kind: DeviceGroupKind::Earpiece,
        priority: 1,
        raw_types: &[raw_type::BUILTIN_EARPIECE],
    },
];

impl DeviceGroupKind {
    /// All groups, highest priority first
    pub const ALL: [DeviceGroupKind; 4] = [
        DeviceGroupKind::Headphones,
        DeviceGroupKind::Bluetooth,
        DeviceGroupKind::Speaker,
        DeviceGroupKind::Earpiece,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceGroupKind::Headphones => "headphones",
            DeviceGroupKind::Bluetooth => "bluetooth",
            DeviceGroupKind::Speaker => "speaker",
            DeviceGroupKind::Earpiece => "earpiece",
        }
    }

    pub fn group(&self) -> &'static DeviceGroup {
        // DEVICE_GROUPS is indexed in the same order as ALL
        let index = match self {
            DeviceGroupKind::Headphones => 0,
            DeviceGroupKind::Bluetooth => 1,
            DeviceGroupKind::Speaker => 2,
            DeviceGroupKind::Earpiece => 3,
        };
        &DEVICE_GROUPS[index]
    }

    pub fn priority(&self) -> u8 {
        self.group().priority
    }

    /// Whether the raw type is a canonical member of this group
    pub fn contains(&self, raw: i32) -> bool {
        self.group().raw_types.contains(&raw)
    }
}

impl fmt::Display for DeviceGroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hysteresis correction that changed a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HysteresisRule {
    /// Bluetooth just dropped; stay on the earpiece instead of the speaker
    BluetoothDropToEarpiece,
    /// Initializing pass; start on the speaker instead of the earpiece
    InitializeToSpeaker,
}

/// Outcome of a group selection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSelection {
    /// Group to route to
    pub group: DeviceGroupKind,
    /// Highest-priority group present, before hysteresis
    pub raw_default: DeviceGroupKind,
    /// Hysteresis rule that fired, if any
    pub rule: Option<HysteresisRule>,
}

/// Classify a raw hardware type.
///
/// Total: unknown types fall back to the earpiece group, which is logged as
/// a policy gap.
pub fn classify(raw: i32) -> DeviceGroupKind {
    for group in DEVICE_GROUPS.iter() {
        if group.raw_types.contains(&raw) {
            return group.kind;
        }
    }
    warn!(
        "Policy gap: raw device type {} ({}) matches no group, treating as earpiece",
        raw,
        super::device::type_name(raw)
    );
    DeviceGroupKind::Earpiece
}

/// Highest-priority group present in the endpoint set (earpiece when empty)
pub fn select_default_group(endpoints: &[AudioEndpoint]) -> DeviceGroupKind {
    endpoints
        .iter()
        .map(|endpoint| classify(endpoint.raw_type))
        .max_by_key(|group| group.priority())
        .unwrap_or(DeviceGroupKind::Earpiece)
}

/// Apply the hysteresis corrections to a freshly computed default
pub fn apply_hysteresis(
    fresh: DeviceGroupKind,
    previous: Option<DeviceGroupKind>,
    is_initialize: bool,
) -> (DeviceGroupKind, Option<HysteresisRule>) {
    if previous == Some(DeviceGroupKind::Bluetooth) && fresh == DeviceGroupKind::Speaker {
        return (DeviceGroupKind::Earpiece, Some(HysteresisRule::BluetoothDropToEarpiece));
    }
    if fresh == DeviceGroupKind::Earpiece && is_initialize {
        return (DeviceGroupKind::Speaker, Some(HysteresisRule::InitializeToSpeaker));
    }
    (fresh, None)
}

/// Pick the group to route to for the given endpoint set.
///
/// A hysteresis target with no endpoint in the set is dropped in favour of
/// the raw default, so the result is always a group present in a non-empty
/// set.
pub fn select_group(
    endpoints: &[AudioEndpoint],
    previous: Option<DeviceGroupKind>,
    is_initialize: bool,
) -> GroupSelection {
    let raw_default = select_default_group(endpoints);
    let (group, rule) = apply_hysteresis(raw_default, previous, is_initialize);

    if rule.is_some() && !endpoints.is_empty() && !has_group(endpoints, group) {
        debug!(
            "Hysteresis target {} not attached, keeping default {}",
            group, raw_default
        );
        return GroupSelection {
            group: raw_default,
            raw_default,
            rule: None,
        };
    }

    if let Some(rule) = rule {
        debug!("Hysteresis {:?}: {} -> {}", rule, raw_default, group);
    }

    GroupSelection {
        group,
        raw_default,
        rule,
    }
}

fn has_group(endpoints: &[AudioEndpoint], group: DeviceGroupKind) -> bool {
    endpoints.iter().any(|endpoint| classify(endpoint.raw_type) == group)
}

/// Pick an endpoint of the group, preferring canonical members over
/// endpoints that only landed in the group through the fallback
pub fn pick_endpoint(endpoints: &[AudioEndpoint], group: DeviceGroupKind) -> Option<&AudioEndpoint> {
    endpoints
        .iter()
        .find(|endpoint| group.contains(endpoint.raw_type))
        .or_else(|| {
            endpoints
                .iter()
                .find(|endpoint| classify(endpoint.raw_type) == group)
        })
}
