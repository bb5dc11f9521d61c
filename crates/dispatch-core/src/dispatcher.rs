//! The dispatcher: receive hook, worker pool, panic barrier
//!
//! See the crate docs for the pipeline shape. The pieces a deployment
//! plugs in:
//!
//! - [`MessageProcessor`] - the pipeline stage immediately after the
//!   dispatcher (the transport's rx path, resumed past this module)
//! - [`StatelessResponder`] - sends a response statelessly to a message's
//!   origin, used for the barrier's 500
//! - [`ExceptionBarrier`] - decides whether a worker survives a panic;
//!   [`PoolSizeBarrier`] implements the stock policy (a single-worker pool
//!   cannot survive, a larger pool continues)
//! - [`LoadMonitor`] - receives one latency report per completed message

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use trellis_infra_common::trail::{self, marker};
use trellis_infra_common::{
    AccumulatorSnapshot, EventAccumulator, EventQueue, LoadMonitor, QueueConfig, Stopwatch, TrailId,
};
use trellis_sip_core::builder::response_for;
use trellis_sip_core::{Header, HeaderAccess, HeaderName, Message, Response, StatusCode};

use crate::error::Result;
use crate::event::{Callback, MessageEvent, RxMessage, WorkItem};

use async_trait::async_trait;

/// The pipeline stage the workers hand each message to.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, rx: RxMessage) -> Result<()>;
}

/// Sends a response statelessly to the origin of a message, outside any
/// transaction.
#[async_trait]
pub trait StatelessResponder: Send + Sync {
    async fn respond(&self, response: Response, trail: TrailId) -> Result<()>;
}

/// What a worker should do after catching a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicDisposition {
    /// Keep draining the queue.
    Continue,
    /// Abort the process; recovery is not possible.
    Abort,
}

/// Decides the fate of a worker that caught a panic.
pub trait ExceptionBarrier: Send + Sync {
    fn on_worker_panic(&self) -> PanicDisposition;
}

/// The stock policy: with one worker the process cannot sensibly continue
/// (the sole worker's state may be corrupt); with more, the peer workers
/// keep the node alive.
#[derive(Debug)]
pub struct PoolSizeBarrier {
    workers: usize,
}

impl PoolSizeBarrier {
    pub fn new(workers: usize) -> Self {
        PoolSizeBarrier { workers }
    }
}

impl ExceptionBarrier for PoolSizeBarrier {
    fn on_worker_panic(&self) -> PanicDisposition {
        if self.workers <= 1 {
            PanicDisposition::Abort
        } else {
            PanicDisposition::Continue
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Size of the worker pool. One worker is a valid degenerate mode with
    /// distinct failure semantics: a panic aborts the process.
    pub workers: usize,
    pub queue: QueueConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            workers: 1,
            queue: QueueConfig::default(),
        }
    }
}

struct WorkerShared {
    queue: Arc<EventQueue<WorkItem>>,
    processor: Arc<dyn MessageProcessor>,
    responder: Arc<dyn StatelessResponder>,
    barrier: Arc<dyn ExceptionBarrier>,
    latency: Arc<EventAccumulator>,
    load: Arc<dyn LoadMonitor>,
}

/// The message dispatch pipeline. See the crate docs.
pub struct Dispatcher {
    config: DispatcherConfig,
    shared: Arc<WorkerShared>,
    queue_depth: Arc<EventAccumulator>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        processor: Arc<dyn MessageProcessor>,
        responder: Arc<dyn StatelessResponder>,
        load: Arc<dyn LoadMonitor>,
    ) -> Self {
        let barrier = Arc::new(PoolSizeBarrier::new(config.workers));
        Dispatcher::with_exception_barrier(config, processor, responder, load, barrier)
    }

    /// As [`Dispatcher::new`] but with a custom panic policy.
    pub fn with_exception_barrier(
        config: DispatcherConfig,
        processor: Arc<dyn MessageProcessor>,
        responder: Arc<dyn StatelessResponder>,
        load: Arc<dyn LoadMonitor>,
        barrier: Arc<dyn ExceptionBarrier>,
    ) -> Self {
        let queue = Arc::new(EventQueue::new(config.queue.clone()));
        Dispatcher {
            config,
            shared: Arc::new(WorkerShared {
                queue,
                processor,
                responder,
                barrier,
                latency: Arc::new(EventAccumulator::new()),
                load,
            }),
            queue_depth: Arc::new(EventAccumulator::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker pool. Call once, before the transport starts
    /// delivering messages.
    pub fn start(&self) {
        let mut workers = self.lock_workers();
        for _ in 0..self.config.workers {
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(Self::worker_loop(shared)));
        }
    }

    /// Terminates the queue and waits for every worker to drain out.
    pub async fn shutdown(&self) {
        self.shared.queue.terminate();
        let handles: Vec<_> = self.lock_workers().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The receive hook. Called by the transport surface for every parsed
    /// inbound message; always returns `true` ("absorbed") so the transport
    /// does not dispatch the message itself.
    pub fn on_rx_message(&self, rdata: &RxMessage) -> bool {
        trail::event(rdata.trail, marker::BEGIN_DISPATCH);

        // If the queue has not been serviced for long enough to imply every
        // worker is wedged, exit so the supervisor restarts the process.
        if self.shared.queue.is_deadlocked() {
            error!("detected worker deadlock - aborting");
            std::process::abort();
        }

        // Timestamp first: latency covers queueing, not just service.
        let stopwatch = Stopwatch::start();

        // Clone the message off the receive buffer; the trail id rides
        // along on the clone.
        let rx = rdata.clone();

        self.queue_depth.accumulate(self.shared.queue.len() as u64);
        trace!(trail = rdata.trail.as_u64(), "queueing cloned message for worker pool");
        if !self.shared.queue.push(WorkItem::Message(MessageEvent { rx, stopwatch })) {
            warn!(trail = rdata.trail.as_u64(), "dispatcher is shut down; message dropped");
        }

        true
    }

    /// Queues a deferred closure; it runs FIFO, interleaved with messages,
    /// on the worker pool.
    pub fn add_callback(&self, callback: Callback) {
        self.queue_depth.accumulate(self.shared.queue.len() as u64);
        if !self.shared.queue.push(WorkItem::Callback(callback)) {
            warn!("dispatcher is shut down; callback dropped");
        }
    }

    /// Current depth of the work queue.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Latency statistics over completed messages, in microseconds.
    pub fn latency_stats(&self) -> AccumulatorSnapshot {
        self.shared.latency.snapshot()
    }

    /// Queue-depth statistics, sampled at each enqueue.
    pub fn queue_depth_stats(&self) -> AccumulatorSnapshot {
        self.queue_depth.snapshot()
    }

    async fn worker_loop(shared: Arc<WorkerShared>) {
        debug!("worker started");
        while let Some(item) = shared.queue.pop().await {
            match item {
                WorkItem::Callback(callback) => callback(),
                WorkItem::Message(event) => Self::handle_message(&shared, event).await,
            }
        }
        debug!("worker stopped");
    }

    async fn handle_message(shared: &WorkerShared, event: MessageEvent) {
        let MessageEvent { rx, stopwatch } = event;
        trace!(trail = rx.trail.as_u64(), "worker dequeued message");

        let outcome = AssertUnwindSafe(shared.processor.process(rx.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(trail = rx.trail.as_u64(), %err, "downstream processing failed");
            }
            Err(panic) => {
                let reason = panic_reason(panic.as_ref()).to_string();
                Self::recover_from_panic(shared, &rx, &reason).await
            }
        }

        trail::event(rx.trail, marker::DISPATCH_COMPLETE);
        let latency_us = stopwatch.read_us();
        trace!(latency_us, "request latency");
        shared.latency.accumulate(latency_us);
        shared.load.request_complete(Duration::from_micros(latency_us));
    }

    async fn recover_from_panic(shared: &WorkerShared, rx: &RxMessage, reason: &str) {
        trail::event(rx.trail, marker::WORKER_FAILURE);

        // Dump what we can about the message. Read defensively: it was
        // mid-processing when the panic fired, so trust nothing.
        error!(
            trail = rx.trail.as_u64(),
            reason,
            "panic while processing message (maybe)"
        );
        if let Some(call_id) = rx.message.call_id() {
            error!(call_id, "panicked message Call-ID (maybe)");
        }
        if let Some((seq, method)) = rx.message.cseq() {
            error!(cseq = seq, method = %method, "panicked message CSeq (maybe)");
        }

        // Answer a non-ACK request with a 500 telling the origin to retry
        // in ten minutes. ACKs and responses get nothing.
        if let Message::Request(req) = &rx.message {
            if !req.is_ack() {
                debug!("returning 500 response following worker panic");
                let mut rsp = response_for(req, StatusCode::InternalServerError);
                rsp.push_header(Header::new(HeaderName::RetryAfter, "600"));
                if let Err(err) = shared.responder.respond(rsp, rx.trail).await {
                    error!(%err, "failed to send 500 after worker panic");
                }
            }
        }

        if shared.barrier.on_worker_panic() == PanicDisposition::Abort {
            error!("sole worker panicked; aborting process");
            std::process::abort();
        }
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
