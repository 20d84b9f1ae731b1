//! Stall detection for the pull pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::engine::EngineTelemetry;

/// Polls engine telemetry on a fixed period and decides whether the pipeline
/// has stalled: the engine is flagged running but nothing pulled samples for
/// a full period.
///
/// Fires at most once, then disarms itself; polling a dead pipeline is
/// pointless, so the host re-arms only on an explicit restart. The first
/// `grace_polls` polls after arming are skipped to let the pipeline warm up.
///
/// The watchdog only observes. Its sole write is clearing the shared frame
/// counter to open the next measurement window.
#[derive(Debug)]
pub struct StallWatchdog {
    telemetry: Arc<EngineTelemetry>,
    grace_polls: u32,
    grace_remaining: u32,
    armed: bool,
}

impl StallWatchdog {
    pub fn new(telemetry: Arc<EngineTelemetry>, grace_polls: u32) -> Self {
        Self {
            telemetry,
            grace_polls,
            grace_remaining: grace_polls,
            armed: true,
        }
    }

    /// One watchdog tick. Returns `true` when a stall was detected; the
    /// watchdog is then disarmed until [`rearm`](Self::rearm).
    pub fn poll(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        if self.grace_remaining > 0 {
            self.grace_remaining -= 1;
            self.telemetry.reset_last_produced_frames();
            return false;
        }
        if self.telemetry.is_running() && self.telemetry.last_produced_frames() == 0 {
            self.armed = false;
            return true;
        }
        self.telemetry.reset_last_produced_frames();
        false
    }

    /// Resume monitoring with a fresh warm-up window.
    pub fn rearm(&mut self) {
        self.armed = true;
        self.grace_remaining = self.grace_polls;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// A watchdog running on its own timer thread.
///
/// Dropping the handle stops the thread at its next tick. `on_stall` runs on
/// the watchdog thread.
pub struct WatchdogHandle {
    alive: Arc<AtomicBool>,
    rearm_requested: Arc<AtomicBool>,
}

impl WatchdogHandle {
    pub fn spawn(
        telemetry: Arc<EngineTelemetry>,
        period: Duration,
        grace_polls: u32,
        on_stall: impl Fn() + Send + 'static,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let rearm_requested = Arc::new(AtomicBool::new(false));
        let thread_alive = Arc::clone(&alive);
        let thread_rearm = Arc::clone(&rearm_requested);
        thread::spawn(move || {
            let mut watchdog = StallWatchdog::new(telemetry, grace_polls);
            while thread_alive.load(Ordering::Relaxed) {
                thread::sleep(period);
                if !thread_alive.load(Ordering::Relaxed) {
                    break;
                }
                if thread_rearm.swap(false, Ordering::Relaxed) {
                    watchdog.rearm();
                }
                if watchdog.poll() {
                    on_stall();
                }
            }
        });
        Self {
            alive,
            rearm_requested,
        }
    }

    /// Ask the watchdog thread to resume monitoring.
    pub fn rearm(&self) {
        self.rearm_requested.store(true, Ordering::Relaxed);
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry() -> Arc<EngineTelemetry> {
        Arc::new(EngineTelemetry::default())
    }

    #[test]
    fn quiet_running_engine_stalls_once() {
        let t = telemetry();
        t.set_running(true);
        let mut dog = StallWatchdog::new(Arc::clone(&t), 0);
        assert!(dog.poll(), "zero frames while running is a stall");
        assert!(!dog.is_armed());
        // Disarmed: no further signals even though nothing changed.
        assert!(!dog.poll());
        assert!(!dog.poll());
    }

    #[test]
    fn producing_engine_never_stalls() {
        let t = telemetry();
        t.set_running(true);
        let mut dog = StallWatchdog::new(Arc::clone(&t), 0);
        for _ in 0..5 {
            t.record_produced_for_test(512);
            assert!(!dog.poll());
            // Each healthy poll opens a fresh window.
            assert_eq!(t.last_produced_frames(), 0);
        }
    }

    #[test]
    fn not_running_engine_is_not_a_stall() {
        let t = telemetry();
        t.set_running(false);
        let mut dog = StallWatchdog::new(Arc::clone(&t), 0);
        assert!(!dog.poll());
        assert!(dog.is_armed());
    }

    #[test]
    fn grace_polls_suppress_early_checks() {
        let t = telemetry();
        t.set_running(true);
        let mut dog = StallWatchdog::new(Arc::clone(&t), 2);
        assert!(!dog.poll());
        assert!(!dog.poll());
        // Warm-up over; a quiet period now counts.
        assert!(dog.poll());
    }

    #[test]
    fn rearm_restores_monitoring_with_fresh_grace() {
        let t = telemetry();
        t.set_running(true);
        let mut dog = StallWatchdog::new(Arc::clone(&t), 1);
        dog.poll();
        assert!(dog.poll(), "stall after grace");
        assert!(!dog.is_armed());

        dog.rearm();
        assert!(dog.is_armed());
        assert!(!dog.poll(), "grace applies again after rearm");
        assert!(dog.poll());
    }
}
