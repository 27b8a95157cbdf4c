//! Audio routing coordinator
//!
//! Owns the routing decision. A routing pass enumerates the attached
//! endpoints, picks one (explicit user choice or the priority policy with
//! hysteresis), switches the OS output, records the choice for the next
//! hysteresis evaluation and publishes the routing table.
//!
//! Two platform generations are supported through [`RoutingStrategy`]:
//!
//! - `CommunicationDevice`: the OS lists communication devices and accepts
//!   a direct assignment. The switch is only issued when the selected
//!   endpoint differs from the active one.
//! - `Legacy`: the general output list (minus telephony endpoints) and the
//!   imperative SCO / speakerphone sequence.
//!
//! A pass whose OS switch fails leaves the previous decision in place and
//! publishes nothing, so audio stays where it was.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::device::{AudioEndpoint, DeviceId};
use super::policy::{self, DeviceGroupKind};
use crate::error::{CallBridgeError, CallBridgeResult};
use crate::events::{BridgeEvent, EventEmitter, RouteEntry};
use crate::platform::{AudioManager, RawDeviceEvent};

/// Device-selection API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    /// Direct communication-device assignment
    CommunicationDevice,
    /// SCO / speakerphone toggles
    Legacy,
}

impl RoutingStrategy {
    /// Pick the strategy from the platform capability flag
    pub fn detect(audio: &dyn AudioManager) -> Self {
        if audio.supports_communication_device() {
            RoutingStrategy::CommunicationDevice
        } else {
            RoutingStrategy::Legacy
        }
    }
}

/// Current routing selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Endpoint carrying voice audio
    pub endpoint: Option<AudioEndpoint>,
    /// Group of that endpoint; the hysteresis input of the next pass
    pub group: Option<DeviceGroupKind>,
    /// Group selected by the pass before
    pub previous_group: Option<DeviceGroupKind>,
}

/// Selects and applies the voice output endpoint
pub struct AudioRoutingCoordinator {
    audio: Arc<dyn AudioManager>,
    strategy: RoutingStrategy,
    events: EventEmitter,
    decision: Mutex<RoutingDecision>,
}

impl AudioRoutingCoordinator {
    /// Create a coordinator, detecting the strategy from the platform
    pub fn new(audio: Arc<dyn AudioManager>, events: EventEmitter) -> Self {
        let strategy = RoutingStrategy::detect(audio.as_ref());
        Self::with_strategy(audio, strategy, events)
    }

    pub fn with_strategy(audio: Arc<dyn AudioManager>, strategy: RoutingStrategy, events: EventEmitter) -> Self {
        info!("Audio routing strategy: {:?}", strategy);
        Self {
            audio,
            strategy,
            events,
            decision: Mutex::new(RoutingDecision::default()),
        }
    }

    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    pub fn decision(&self) -> RoutingDecision {
        self.decision.lock().clone()
    }

    /// Forget the current selection so the next pass starts fresh
    pub fn reset(&self) {
        *self.decision.lock() = RoutingDecision::default();
    }

    /// Output endpoints usable for voice right now
    pub fn enumerate_endpoints(&self) -> CallBridgeResult<Vec<AudioEndpoint>> {
        match self.strategy {
            RoutingStrategy::CommunicationDevice => self.audio.available_communication_devices(),
            RoutingStrategy::Legacy => Ok(self
                .audio
                .output_devices()?
                .into_iter()
                .filter(|endpoint| !endpoint.is_telephony())
                .collect()),
        }
    }

    /// Run a routing pass.
    ///
    /// `explicit` selects a specific endpoint when it is attached; otherwise
    /// the policy decides. `is_initialize` marks the first pass of a call.
    /// Returns the applied decision, or `None` when nothing changed.
    pub fn on_devices_changed(&self, explicit: Option<DeviceId>, is_initialize: bool) -> Option<RoutingDecision> {
        let mut decision = self.decision.lock();

        let endpoints = match self.enumerate_endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("Failed to enumerate audio devices: {}", e);
                return None;
            }
        };
        if endpoints.is_empty() {
            info!("No audio endpoints attached, routing unchanged");
            return None;
        }

        let explicit_endpoint = explicit.and_then(|id| {
            let found = endpoints.iter().find(|endpoint| endpoint.id == id);
            if found.is_none() {
                warn!("Requested audio device {} is not attached, using policy", id);
            }
            found
        });

        let (endpoint, group) = match explicit_endpoint {
            Some(endpoint) => {
                debug!("User override: routing to {}", endpoint);
                (endpoint.clone(), policy::classify(endpoint.raw_type))
            }
            None => {
                let selection = policy::select_group(&endpoints, decision.group, is_initialize);
                match policy::pick_endpoint(&endpoints, selection.group) {
                    Some(endpoint) => (endpoint.clone(), selection.group),
                    None => {
                        error!("Selected group {} has no attached endpoint", selection.group);
                        return None;
                    }
                }
            }
        };

        if let Err(e) = self.apply(&endpoint, group) {
            warn!("Failed to route audio to {}: {}", endpoint, e);
            return None;
        }

        let previous_group = decision.group;
        *decision = RoutingDecision {
            endpoint: Some(endpoint.clone()),
            group: Some(group),
            previous_group,
        };
        info!("Audio routed to {} ({})", endpoint, group);

        self.events.emit(BridgeEvent::UpdateAudioDevice {
            routes: routing_table(&endpoints, endpoint.id),
        });

        Some(decision.clone())
    }

    fn apply(&self, endpoint: &AudioEndpoint, group: DeviceGroupKind) -> CallBridgeResult<()> {
        match self.strategy {
            RoutingStrategy::CommunicationDevice => {
                let current = self.audio.communication_device().unwrap_or_else(|e| {
                    debug!("Could not read active communication device: {}", e);
                    None
                });
                if current == Some(endpoint.id) {
                    debug!("{} already active", endpoint);
                    return Ok(());
                }
                if self.audio.set_communication_device(endpoint.id)? {
                    Ok(())
                } else {
                    Err(CallBridgeError::DeviceNotFound {
                        device_id: endpoint.id.0,
                    })
                }
            }
            RoutingStrategy::Legacy => match group {
                DeviceGroupKind::Bluetooth => {
                    self.audio.start_bluetooth_sco()?;
                    self.audio.set_bluetooth_sco_on(true)?;
                    self.audio.set_speakerphone_on(false)
                }
                DeviceGroupKind::Speaker => {
                    self.audio.stop_bluetooth_sco()?;
                    self.audio.set_bluetooth_sco_on(false)?;
                    self.audio.set_speakerphone_on(true)
                }
                DeviceGroupKind::Headphones | DeviceGroupKind::Earpiece => {
                    self.audio.stop_bluetooth_sco()?;
                    self.audio.set_bluetooth_sco_on(false)?;
                    self.audio.set_speakerphone_on(false)
                }
            },
        }
    }

    /// Immediate handling of Bluetooth SCO sub-events.
    ///
    /// Runs outside the debounced path; the routing re-evaluation still
    /// arrives through the debouncer.
    pub fn handle_bluetooth_event(&self, event: &RawDeviceEvent) {
        let start = match event {
            RawDeviceEvent::BluetoothAdapterStateChanged { enabled } => *enabled,
            RawDeviceEvent::HeadsetConnectionChanged { connected } => *connected,
            RawDeviceEvent::ScoAudioStateChanged(state) => {
                debug!("Bluetooth SCO audio state: {:?}", state);
                return;
            }
            other => {
                debug!("Not a Bluetooth SCO event: {:?}", other);
                return;
            }
        };

        if self.strategy != RoutingStrategy::Legacy {
            debug!("SCO link managed by the platform, ignoring {:?}", event);
            return;
        }

        let result = if start {
            self.audio
                .start_bluetooth_sco()
                .and_then(|_| self.audio.set_bluetooth_sco_on(true))
        } else {
            self.audio
                .stop_bluetooth_sco()
                .and_then(|_| self.audio.set_bluetooth_sco_on(false))
        };

        match result {
            Ok(()) => info!("Bluetooth SCO {}", if start { "started" } else { "stopped" }),
            Err(e) => warn!("Failed to toggle Bluetooth SCO: {}", e),
        }
    }
}

/// One entry per visible endpoint, active flag on the selected one
fn routing_table(endpoints: &[AudioEndpoint], active: DeviceId) -> Vec<RouteEntry> {
    endpoints
        .iter()
        .map(|endpoint| {
            let group = policy::classify(endpoint.raw_type);
            RouteEntry {
                group,
                type_name: endpoint.type_name.clone(),
                priority: group.priority(),
                id: endpoint.id,
                active: endpoint.id == active,
            }
        })
        .collect()
}
