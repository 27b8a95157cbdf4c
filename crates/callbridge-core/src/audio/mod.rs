//! Audio routing
//!
//! Endpoint catalog and priority policy, focus handling, and the routing
//! coordinator fed by the device-change debouncer.

pub mod debounce;
pub mod device;
pub mod focus;
pub mod policy;
pub mod routing;

pub use debounce::DeviceChangeDebouncer;
pub use device::{AudioEndpoint, DeviceId};
pub use focus::{AudioFocusController, FocusState};
pub use policy::{DeviceGroupKind, GroupSelection, HysteresisRule};
pub use routing::{AudioRoutingCoordinator, RoutingDecision, RoutingStrategy};
