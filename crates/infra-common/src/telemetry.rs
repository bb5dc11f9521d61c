//! Telemetry accumulators
//!
//! The statistics tables the edge node exports: event accumulators for
//! latency and queue depth, and plain counters for per-service request and
//! response volumes. The core treats these as opaque sinks; the scraping
//! surface (SNMP or otherwise) lives outside this workspace and reads
//! [`AccumulatorSnapshot`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

#[derive(Debug, Default)]
struct AccumulatorState {
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

/// Accumulates u64 samples (latency in microseconds, queue depths).
#[derive(Debug, Default)]
pub struct EventAccumulator {
    state: Mutex<AccumulatorState>,
}

/// A point-in-time view of an accumulator.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AccumulatorSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
    pub mean: u64,
}

impl EventAccumulator {
    pub fn new() -> Self {
        EventAccumulator::default()
    }

    fn lock(&self) -> MutexGuard<'_, AccumulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one sample.
    pub fn accumulate(&self, sample: u64) {
        let mut state = self.lock();
        if state.count == 0 {
            state.min = sample;
            state.max = sample;
        } else {
            state.min = state.min.min(sample);
            state.max = state.max.max(sample);
        }
        state.count += 1;
        state.sum = state.sum.saturating_add(sample);
    }

    /// Reads the current statistics.
    pub fn snapshot(&self) -> AccumulatorSnapshot {
        let state = self.lock();
        AccumulatorSnapshot {
            count: state.count,
            sum: state.sum,
            min: state.min,
            max: state.max,
            mean: if state.count == 0 {
                0
            } else {
                state.sum / state.count
            },
        }
    }
}

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Counter::default()
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}
