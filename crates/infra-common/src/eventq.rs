//! Work queue for the dispatcher's worker pool
//!
//! A FIFO multi-producer/multi-consumer queue with two properties the SIP
//! edge needs beyond a plain channel:
//!
//! - **Age-based deadlock detection.** If the head item has been waiting
//!   longer than the configured threshold and no consumer has taken anything
//!   in that window, every worker is presumed wedged. The queue only reports
//!   this ([`EventQueue::is_deadlocked`]); the dispatcher decides to abort,
//!   because any softer recovery risks a storm of SIP retransmissions.
//! - **Cooperative shutdown.** [`EventQueue::terminate`] unblocks every
//!   pending [`EventQueue::pop`] with the `None` sentinel and makes further
//!   pushes no-ops, so workers drain out cleanly.
//!
//! `push` is synchronous and may be called from any thread; `pop` is async
//! and suspends on a [`Notify`] until an item or termination arrives.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Age the head item must reach, with no intervening pop, before the
    /// queue declares deadlock. Roughly twice the worst-case service time
    /// for one message.
    pub deadlock_threshold: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            deadlock_threshold: Duration::from_secs(4),
        }
    }
}

struct Entry<T> {
    item: T,
    enqueued: Instant,
}

struct Inner<T> {
    items: VecDeque<Entry<T>>,
    terminated: bool,
    last_pop: Instant,
}

/// FIFO work queue with deadlock detection. See the module docs.
pub struct EventQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    deadlock_threshold: Duration,
}

impl<T> EventQueue<T> {
    pub fn new(config: QueueConfig) -> Self {
        EventQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                terminated: false,
                last_pop: Instant::now(),
            }),
            notify: Notify::new(),
            deadlock_threshold: config.deadlock_threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A poisoned queue mutex only means a panic elsewhere while holding
        // the lock; the queue state itself stays coherent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item. Returns `false` if the queue has been terminated,
    /// in which case the item is dropped.
    pub fn push(&self, item: T) -> bool {
        {
            let mut inner = self.lock();
            if inner.terminated {
                return false;
            }
            inner.items.push_back(Entry {
                item,
                enqueued: Instant::now(),
            });
        }
        self.notify.notify_one();
        true
    }

    /// Takes the oldest item, waiting if the queue is empty.
    ///
    /// Items queued before termination are still handed out; `None` is
    /// returned once the queue is both terminated and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let mut inner = self.lock();
                if let Some(entry) = inner.items.pop_front() {
                    inner.last_pop = Instant::now();
                    return Some(entry.item);
                }
                if inner.terminated {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unblocks all pending `pop` calls with the shutdown sentinel and
    /// rejects subsequent pushes. Idempotent.
    pub fn terminate(&self) {
        {
            let mut inner = self.lock();
            inner.terminated = true;
        }
        self.notify.notify_waiters();
    }

    /// True when the head item's enqueue age exceeds the threshold AND no
    /// pop has completed within that window.
    pub fn is_deadlocked(&self) -> bool {
        let inner = self.lock();
        match inner.items.front() {
            Some(entry) => {
                let now = Instant::now();
                now.duration_since(entry.enqueued) > self.deadlock_threshold
                    && now.duration_since(inner.last_pop) > self.deadlock_threshold
            }
            None => false,
        }
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        EventQueue::new(QueueConfig::default())
    }
}
