//! Cancelable timers
//!
//! A [`CancelableTimer`] is a deadline plus a cancel token: the action runs
//! once when the deadline passes unless the token was cancelled first.
//! Timers are spawned on a captured runtime [`Handle`], so they can be
//! armed from OS callback threads that are not part of any runtime.
//!
//! [`TimerSlot`] holds at most one pending timer and is the building block
//! for debouncing: restarting the slot cancels whatever was pending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A scheduled, cancelable one-shot action
#[derive(Debug)]
pub struct CancelableTimer {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl CancelableTimer {
    /// Run `action` after `delay` unless cancelled first
    pub fn schedule<F>(runtime: &Handle, delay: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let _guard = runtime.enter();
        let token = CancellationToken::new();
        let deadline = Instant::now() + delay;
        let fired = Arc::new(AtomicBool::new(false));

        let task_token = token.clone();
        let task_fired = fired.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if !task_token.is_cancelled() {
                        task_fired.store(true, Ordering::SeqCst);
                        action();
                    }
                }
            }
        });

        Self { token, fired }
    }

    /// Prevent the action from running. No effect once it has fired.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Still waiting for its deadline
    pub fn is_pending(&self) -> bool {
        !self.is_cancelled() && !self.has_fired()
    }
}

/// Holder for at most one pending timer
#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    runtime: Handle,
    current: Mutex<Option<CancelableTimer>>,
}

impl TimerSlot {
    pub fn new(name: &'static str, runtime: Handle) -> Self {
        Self {
            name,
            runtime,
            current: Mutex::new(None),
        }
    }

    /// Cancel any pending timer and arm a new one
    pub fn restart<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            if previous.is_pending() {
                trace!("Timer '{}' restarted before firing", self.name);
            }
            previous.cancel();
        }
        *current = Some(CancelableTimer::schedule(&self.runtime, delay, action));
    }

    /// Cancel the pending timer. Returns whether one was still pending.
    pub fn cancel(&self) -> bool {
        match self.current.lock().take() {
            Some(timer) => {
                let was_pending = timer.is_pending();
                timer.cancel();
                was_pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(CancelableTimer::is_pending)
            .unwrap_or(false)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(timer) = self.current.get_mut().take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let timer = CancelableTimer::schedule(&Handle::current(), Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(timer.has_fired());
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let timer = CancelableTimer::schedule(&Handle::current(), Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        timer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(timer.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_restart_keeps_only_last() {
        let slot = TimerSlot::new("test", Handle::current());
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = hits.clone();
            slot.restart(Duration::from_millis(100), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert!(slot.is_pending());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_cancel_is_idempotent() {
        let slot = TimerSlot::new("test", Handle::current());
        assert!(!slot.cancel());

        slot.restart(Duration::from_millis(100), || {});
        assert!(slot.cancel());
        assert!(!slot.cancel());
        assert!(!slot.is_pending());
    }
}
