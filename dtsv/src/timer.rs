//! The timer idiom shared by every per-connection timer (A-timer, RTX
//! timer, sender- and receiver-inactivity timers, §5): `restart` rearms,
//! `stop` reports whether the interval had already elapsed.
//!
//! The teacher (`dtcp/src/lib.rs::Timer`) checks expiry lazily, inline at
//! the next send/recv call. The data-transfer core needs the stronger
//! guarantee that an expired timer *fires on its own* and posts a unit of
//! work rather than waiting to be polled (§5: "each callback posts a unit
//! of work to a per-DTP work queue so the fast path never blocks on a
//! callback"; §9: "timer callbacks as messages"). [`ArmableTimer`] keeps
//! the same enable/interval/restart shape but backs it with
//! `futures-timer` and a generation counter instead of a polled boolean.
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_std::task::{self, JoinHandle};
use futures_timer::Delay;

/// A restart/stop timer checked inline by its owner rather than firing on
/// its own. Used where the core only needs to know, at the next send or
/// receive, whether the interval elapsed since the last restart.
pub struct Timer {
    enabled: bool,
    start: Instant,
    interval: Duration,
}

impl Timer {
    /// Creates a new, disabled timer with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            enabled: false,
            start: Instant::now(),
            interval,
        }
    }

    /// Current interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Updates the interval used by the next `start`.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// (Re)starts the timer.
    pub fn start(&mut self) {
        self.start = Instant::now();
        self.enabled = true;
    }

    /// Disables the timer, returning whether it had already elapsed.
    pub fn stop(&mut self) -> bool {
        if self.enabled {
            self.enabled = false;
            Instant::now() - self.start > self.interval
        } else {
            false
        }
    }
}

/// A timer that fires on its own after `interval`, invoking an async
/// callback, unless restarted or cancelled first.
///
/// Restarting bumps a generation counter; a wakeup that no longer matches
/// the current generation is a no-op rather than a race (§9: policy code
/// never races with itself for the same connection).
pub struct ArmableTimer {
    generation: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl ArmableTimer {
    /// Creates a new, unarmed timer with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            handle: None,
            interval,
        }
    }

    /// Current interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Updates the interval used by the next `arm`.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Arms (or re-arms) the timer. Any previously armed fire is
    /// invalidated: its wakeup will observe a stale generation and do
    /// nothing.
    pub fn arm<F, Fut>(&mut self, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let interval = self.interval;
        let handle = task::spawn(async move {
            Delay::new(interval).await;
            if generation.load(Ordering::SeqCst) == my_generation {
                on_fire().await;
            }
        });
        self.handle = Some(handle);
    }

    /// Cancels the timer, waiting for an in-flight callback to finish
    /// before returning (§5 cancellation guarantee).
    pub async fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_timer_reports_elapsed() {
        let mut t = Timer::new(Duration::from_millis(0));
        t.start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.stop());
    }

    #[test]
    fn lazy_timer_disabled_never_elapsed() {
        let mut t = Timer::new(Duration::from_millis(1000));
        assert!(!t.stop());
    }
}
