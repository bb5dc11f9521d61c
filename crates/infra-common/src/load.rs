//! Load-monitor seam
//!
//! Admission control does not live in the dispatch core; it is consulted
//! upstream of the receive hook. What the core owes the load monitor is one
//! latency report per completed message, so the monitor can steer its
//! admission target. [`TargetLatencyMonitor`] is the default implementation;
//! [`NullLoadMonitor`] is for tests and for deployments that police load
//! elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The seam between the dispatcher and admission control.
pub trait LoadMonitor: Send + Sync {
    /// Reports the end-to-end latency of one completed message.
    fn request_complete(&self, latency: Duration);

    /// Whether a new request should be admitted right now.
    fn admit_request(&self) -> bool;
}

/// Tracks an exponentially weighted moving average of request latency
/// against a target, and stops admitting once the average runs past twice
/// the target.
#[derive(Debug)]
pub struct TargetLatencyMonitor {
    target_us: u64,
    smoothed_us: AtomicU64,
}

impl TargetLatencyMonitor {
    pub fn new(target: Duration) -> Self {
        TargetLatencyMonitor {
            target_us: u64::try_from(target.as_micros()).unwrap_or(u64::MAX),
            smoothed_us: AtomicU64::new(0),
        }
    }

    /// The current smoothed latency estimate.
    pub fn smoothed_latency(&self) -> Duration {
        Duration::from_micros(self.smoothed_us.load(Ordering::Relaxed))
    }
}

impl LoadMonitor for TargetLatencyMonitor {
    fn request_complete(&self, latency: Duration) {
        let sample = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        // EWMA with alpha = 1/8, same shape as the RFC 6298 RTT estimator.
        let mut current = self.smoothed_us.load(Ordering::Relaxed);
        loop {
            let next = if current == 0 {
                sample
            } else {
                current - current / 8 + sample / 8
            };
            match self.smoothed_us.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    fn admit_request(&self) -> bool {
        self.smoothed_us.load(Ordering::Relaxed) <= self.target_us.saturating_mul(2)
    }
}

/// Accepts everything and records nothing.
#[derive(Debug, Default)]
pub struct NullLoadMonitor;

impl LoadMonitor for NullLoadMonitor {
    fn request_complete(&self, _latency: Duration) {}

    fn admit_request(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_until_latency_runs_hot() {
        let monitor = TargetLatencyMonitor::new(Duration::from_millis(10));
        assert!(monitor.admit_request());

        for _ in 0..50 {
            monitor.request_complete(Duration::from_millis(100));
        }
        assert!(!monitor.admit_request());
    }

    #[test]
    fn recovers_when_latency_falls() {
        let monitor = TargetLatencyMonitor::new(Duration::from_millis(10));
        for _ in 0..50 {
            monitor.request_complete(Duration::from_millis(100));
        }
        assert!(!monitor.admit_request());

        for _ in 0..200 {
            monitor.request_complete(Duration::from_millis(1));
        }
        assert!(monitor.admit_request());
    }
}
