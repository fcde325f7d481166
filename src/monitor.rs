/*!
 * Own-state monitoring loop
 *
 * Samples the local coordinator at an adaptively controlled rate and
 * publishes a state event whenever the sampled snapshot differs from the
 * previous one. The rate halves while checking eats more than 40% of the
 * iteration budget and doubles back up to the base rate while it stays
 * under 20%; both directions are clamped so the interval can never reach
 * zero or run away.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::ManagerConfig;
use crate::error::Result;
use crate::events::{EventPublisher, ManagerEvent, MasterState};

/// Snapshot of the local coordinator state
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Timestamp of the coordinator's last change
    pub timestamp: DateTime<Utc>,

    /// Fingerprint of the coordinator contents
    pub fingerprint: u64,
}

/// Samples the local coordinator. The monitor owns the sampler and calls it
/// from its own thread; sampling never runs concurrently with itself.
pub trait StateSampler: Send {
    fn sample(&mut self) -> Result<StateSnapshot>;
}

/// Identity the monitor reports in its state events
#[derive(Debug, Clone)]
pub struct ReporterIdentity {
    /// Address of this host
    pub host: String,

    /// Registry endpoint of the local coordinator
    pub registry_uri: String,

    /// Name of the reporting component
    pub reporter: String,

    /// Monitoring endpoint other hosts may query
    pub monitor_uri: String,
}

/// Monitors the local coordinator and publishes state changes
pub struct OwnStateMonitor {
    base_hz: f64,
    min_hz: f64,
    identity: ReporterIdentity,
    publisher: EventPublisher,
}

impl OwnStateMonitor {
    pub fn new(
        config: &ManagerConfig,
        identity: ReporterIdentity,
        publisher: EventPublisher,
    ) -> Self {
        OwnStateMonitor {
            base_hz: config.base_poll_hz,
            min_hz: config.min_poll_hz,
            identity,
            publisher,
        }
    }

    /// Start the polling loop on its own thread
    pub fn spawn(self, mut sampler: Box<dyn StateSampler>) -> MonitorHandle {
        let paused = Arc::new(AtomicBool::new(false));
        let reset = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread = {
            let paused = paused.clone();
            let reset = reset.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                let mut current_hz = self.base_hz;
                let mut previous: Option<StateSnapshot> = None;
                while !shutdown.load(Ordering::SeqCst) {
                    if !paused.load(Ordering::SeqCst) {
                        if reset.swap(false, Ordering::SeqCst) {
                            previous = None;
                        }
                        let started = Instant::now();
                        match sampler.sample() {
                            Ok(snapshot) => {
                                if previous.as_ref() != Some(&snapshot) {
                                    self.publish_state(&snapshot);
                                    previous = Some(snapshot);
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "state check failed");
                            }
                        }
                        let check_time = started.elapsed().as_secs_f64();
                        current_hz = adapt_rate(current_hz, check_time, self.base_hz, self.min_hz);
                    }
                    sleep_interruptible(Duration::from_secs_f64(1.0 / current_hz), &shutdown);
                }
                debug!("own-state monitor stopped");
            })
        };

        MonitorHandle {
            paused,
            reset,
            shutdown,
            thread: Some(thread),
        }
    }

    fn publish_state(&self, snapshot: &StateSnapshot) {
        // The local coordinator is by definition reachable from here
        self.publisher.publish(ManagerEvent::MasterState(MasterState {
            host: self.identity.host.clone(),
            registry_uri: self.identity.registry_uri.clone(),
            timestamp: snapshot.timestamp,
            online: true,
            reporter: self.identity.reporter.clone(),
            monitor_uri: self.identity.monitor_uri.clone(),
        }));
    }
}

/// Feedback control of the poll rate: halve when the check consumes more
/// than 40% of the iteration budget, double back toward the base rate when
/// it consumes less than 20%. Clamped to [min_hz, base_hz].
fn adapt_rate(current_hz: f64, check_time: f64, base_hz: f64, min_hz: f64) -> f64 {
    if current_hz * check_time > 0.4 {
        (current_hz / 2.0).max(min_hz)
    } else if current_hz * check_time < 0.2 && current_hz < base_hz {
        (current_hz * 2.0).min(base_hz)
    } else {
        current_hz
    }
}

fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) {
    let slice = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(slice.min(remaining));
    }
}

/// Control handle of a running monitor
pub struct MonitorHandle {
    paused: Arc<AtomicBool>,
    reset: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Pause or resume the checks; the loop keeps sleeping at its current
    /// rate while paused. Resuming resets the comparison state so the next
    /// check emits at least one event.
    pub fn pause(&self, state: bool) {
        if !state && self.paused.load(Ordering::SeqCst) {
            self.reset.store(true, Ordering::SeqCst);
        }
        self.paused.store(state, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for the thread to finish
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapt_rate_halves_under_load() {
        // 1 Hz with a 0.5 s check: 50% of the budget
        assert_eq!(adapt_rate(1.0, 0.5, 1.0, 0.0625), 0.5);
    }

    #[test]
    fn test_adapt_rate_recovers_to_base() {
        assert_eq!(adapt_rate(0.5, 0.0, 1.0, 0.0625), 1.0);
        // Never overshoots the base rate
        assert_eq!(adapt_rate(1.0, 0.0, 1.0, 0.0625), 1.0);
    }

    #[test]
    fn test_adapt_rate_clamps_to_floor() {
        let mut hz = 1.0;
        for _ in 0..64 {
            hz = adapt_rate(hz, 10.0, 1.0, 0.0625);
        }
        assert_eq!(hz, 0.0625);
        assert!(hz > 0.0);
    }

    #[test]
    fn test_adapt_rate_steady_zone_keeps_rate() {
        // 30% of the budget: neither halve nor double
        assert_eq!(adapt_rate(1.0, 0.3, 1.0, 0.0625), 1.0);
    }
}
