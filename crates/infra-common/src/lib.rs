//! # Trellis Infrastructure Common
//!
//! Infrastructure shared across the trellis crates, kept free of any SIP
//! dependency so it sits at the bottom of the workspace:
//!
//! - [`eventq`] - the multi-producer/multi-consumer work queue with
//!   age-based deadlock detection that feeds the worker pool
//! - [`telemetry`] - accumulator tables and counters behind the operator
//!   surface
//! - [`load`] - the load-monitor seam the dispatcher reports latency to
//! - [`trail`] - correlation ids and trail events for distributed logging
//! - [`stopwatch`] - monotonic latency measurement

pub mod eventq;
pub mod load;
pub mod stopwatch;
pub mod telemetry;
pub mod trail;

pub use eventq::{EventQueue, QueueConfig};
pub use load::{LoadMonitor, NullLoadMonitor, TargetLatencyMonitor};
pub use stopwatch::Stopwatch;
pub use telemetry::{AccumulatorSnapshot, Counter, EventAccumulator};
pub use trail::TrailId;
