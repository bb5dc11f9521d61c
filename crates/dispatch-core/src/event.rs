//! Work items for the dispatch queue
//!
//! The queue carries two kinds of work: cloned inbound messages and
//! deferred closures. A [`MessageEvent`] pairs the clone with the stopwatch
//! started at receive time, so the latency recorded after processing
//! covers queueing as well as service time.

use trellis_infra_common::{Stopwatch, TrailId};
use trellis_sip_core::Message;

/// An inbound message, cloned off the receive buffer and tagged with its
/// trail id.
#[derive(Debug, Clone)]
pub struct RxMessage {
    pub message: Message,
    pub trail: TrailId,
}

impl RxMessage {
    pub fn new(message: Message, trail: TrailId) -> Self {
        RxMessage { message, trail }
    }
}

/// A queued message plus its latency stopwatch.
#[derive(Debug)]
pub struct MessageEvent {
    pub rx: RxMessage,
    pub stopwatch: Stopwatch,
}

/// A deferred closure to run on a worker thread. Must not block
/// indefinitely; there is no preemption.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// One unit of work for the pool.
pub enum WorkItem {
    Message(MessageEvent),
    Callback(Callback),
}
