//! Device change debouncer
//!
//! Bluetooth and wired-headset (dis)connects produce bursts of OS callbacks
//! within milliseconds. Every generic event restarts a timer; the routing
//! re-evaluation runs once the window passes without a further event and
//! enumerates the devices attached at that moment.
//!
//! Bluetooth SCO sub-events skip the window and go straight to the
//! coordinator's immediate SCO handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, trace};

use super::routing::AudioRoutingCoordinator;
use crate::platform::{DeviceEventListener, RawDeviceEvent};
use crate::timer::TimerSlot;

/// Coalesces raw device events into routing passes
pub struct DeviceChangeDebouncer {
    routing: Arc<AudioRoutingCoordinator>,
    window: Duration,
    slot: TimerSlot,
    signals: Arc<AtomicU64>,
}

impl DeviceChangeDebouncer {
    pub fn new(routing: Arc<AudioRoutingCoordinator>, window: Duration, runtime: Handle) -> Self {
        Self {
            routing,
            window,
            slot: TimerSlot::new("device-debounce", runtime),
            signals: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Feed one raw OS event
    pub fn submit(&self, event: RawDeviceEvent) {
        if event.is_sco_sub_event() {
            self.routing.handle_bluetooth_event(&event);
            return;
        }

        trace!("Device event {:?}, restarting {:?} window", event, self.window);
        let routing = self.routing.clone();
        let signals = self.signals.clone();
        self.slot.restart(self.window, move || {
            signals.fetch_add(1, Ordering::SeqCst);
            debug!("Device set settled, re-evaluating routing");
            routing.on_devices_changed(None, false);
        });
    }

    /// Drop a pending signal. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let cancelled = self.slot.cancel();
        if cancelled {
            debug!("Pending device-change signal cancelled");
        }
        cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_pending()
    }

    /// Signals delivered downstream so far
    pub fn signal_count(&self) -> u64 {
        self.signals.load(Ordering::SeqCst)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl DeviceEventListener for DeviceChangeDebouncer {
    fn on_device_event(&self, event: RawDeviceEvent) {
        self.submit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::{raw_type, AudioEndpoint, DeviceId};
    use crate::events::{BridgeEvent, EventEmitter};
    use crate::platform::mock::{MockPlatform, PlatformCall};
    use crate::platform::ScoAudioState;
    use tokio::sync::broadcast;

    const WINDOW: Duration = Duration::from_millis(1500);

    fn setup(legacy: bool) -> (Arc<MockPlatform>, DeviceChangeDebouncer, broadcast::Receiver<BridgeEvent>) {
        let platform = Arc::new(MockPlatform::phone());
        platform.set_supports_communication_device(!legacy);
        let events = EventEmitter::new(16);
        let rx = events.subscribe_receiver();
        let routing = Arc::new(AudioRoutingCoordinator::new(platform.clone(), events));
        let debouncer = DeviceChangeDebouncer::new(routing, WINDOW, Handle::current());
        (platform, debouncer, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_single_signal() {
        let (platform, debouncer, mut rx) = setup(false);

        let headset = AudioEndpoint::new(7, raw_type::BLUETOOTH_SCO);
        for _ in 0..5 {
            debouncer.submit(RawDeviceEvent::DevicesAdded(vec![headset.clone()]));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        // Device set only becomes final at the end of the burst
        platform.set_devices(vec![
            AudioEndpoint::new(1, raw_type::BUILTIN_EARPIECE),
            AudioEndpoint::new(2, raw_type::BUILTIN_SPEAKER),
            headset,
        ]);
        assert_eq!(debouncer.signal_count(), 0);

        tokio::time::sleep(WINDOW).await;

        assert_eq!(debouncer.signal_count(), 1);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.payload()["bluetooth"]["active"], true);
        assert!(rx.try_recv().is_err());
        assert_eq!(platform.active_device(), Some(DeviceId(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_quiet_periods_signal_separately() {
        let (_platform, debouncer, _rx) = setup(false);

        debouncer.submit(RawDeviceEvent::CommunicationDeviceChanged(None));
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        debouncer.submit(RawDeviceEvent::CommunicationDeviceChanged(None));
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;

        assert_eq!(debouncer.signal_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_signal() {
        let (_platform, debouncer, mut rx) = setup(false);

        debouncer.submit(RawDeviceEvent::DevicesRemoved(vec![]));
        assert!(debouncer.is_pending());
        assert!(debouncer.cancel());

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(debouncer.signal_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sco_events_bypass_window() {
        let (platform, debouncer, _rx) = setup(true);

        debouncer.on_device_event(RawDeviceEvent::HeadsetConnectionChanged { connected: true });
        debouncer.on_device_event(RawDeviceEvent::ScoAudioStateChanged(ScoAudioState::Connected));

        assert!(!debouncer.is_pending());
        assert_eq!(platform.count_calls(|c| matches!(c, PlatformCall::StartBluetoothSco)), 1);
        assert!(platform.sco_on());
    }
}
