//! # Trellis Dispatch Core
//!
//! The message dispatch pipeline: the receive hook that pulls every inbound
//! SIP message off its transport thread, and the worker pool that processes
//! the clones.
//!
//! The hook runs early - after minimal parse-error handling but before any
//! stateful SIP processing - so the clone it takes is fully parsed yet has
//! not touched transaction state. Each message is cloned off the receive
//! buffer, stamped with its trail id, paired with a stopwatch, and queued;
//! a worker picks it up, runs the next pipeline stage inside a panic
//! barrier, then records the end-to-end latency and notifies the load
//! monitor.
//!
//! Deferred closures share the same queue and pool
//! ([`Dispatcher::add_callback`]), so they interleave FIFO with messages.
//!
//! ## Failure policy
//!
//! A panic in downstream processing is caught: diagnostics are logged
//! defensively, a `500` with `Retry-After: 600` is sent statelessly when
//! the message was a non-ACK request, and the worker continues - unless the
//! pool has a single worker, in which case the process aborts, since the
//! only worker's state may be corrupt. A deadlocked queue (head item older
//! than the threshold with no pop) also aborts: fail fast and let the
//! supervisor restart the node rather than feed a retransmission storm.

pub mod dispatcher;
pub mod error;
pub mod event;

pub use dispatcher::{
    Dispatcher, DispatcherConfig, ExceptionBarrier, MessageProcessor, PanicDisposition,
    PoolSizeBarrier, StatelessResponder,
};
pub use error::{DispatchError, Result};
pub use event::{Callback, MessageEvent, RxMessage, WorkItem};
