//! Event queue behaviour tests
//!
//! Covers the deadlock-detection contract and concurrent producer/consumer
//! operation of the work queue.

use std::sync::Arc;
use std::time::Duration;

use trellis_infra_common::{EventQueue, QueueConfig};

fn short_fuse_queue() -> EventQueue<u32> {
    EventQueue::new(QueueConfig {
        deadlock_threshold: Duration::from_millis(50),
    })
}

#[tokio::test]
async fn deadlock_requires_an_aged_head_item() {
    let queue = short_fuse_queue();

    // Empty queue is never deadlocked, however long it sits idle.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!queue.is_deadlocked());

    // A fresh head item is not a deadlock either.
    queue.push(1);
    assert!(!queue.is_deadlocked());

    // Once the head ages past the threshold with no pop, it is.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(queue.is_deadlocked());
}

#[tokio::test]
async fn a_recent_pop_clears_the_deadlock_verdict() {
    let queue = short_fuse_queue();
    queue.push(1);
    queue.push(2);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(queue.is_deadlocked());

    // Consuming the head shows the workers are alive; the remaining item
    // was enqueued at the same time but the recent pop vetoes the verdict.
    assert_eq!(queue.pop().await, Some(1));
    assert!(!queue.is_deadlocked());
}

#[tokio::test]
async fn pop_wakes_when_an_item_arrives() {
    let queue = Arc::new(EventQueue::default());

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.pop().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.push(42u32);

    assert_eq!(consumer.await.unwrap(), Some(42));
}

#[tokio::test]
async fn many_producers_and_consumers_drain_everything() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 100;

    let queue: Arc<EventQueue<u32>> = Arc::new(EventQueue::default());

    let mut consumers = Vec::new();
    for _ in 0..3 {
        let queue = Arc::clone(&queue);
        consumers.push(tokio::spawn(async move {
            let mut taken = Vec::new();
            while let Some(item) = queue.pop().await {
                taken.push(item);
            }
            taken
        }));
    }

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                assert!(queue.push(p * PER_PRODUCER + i));
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    // Let the consumers drain, then shut them down.
    while !queue.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    queue.terminate();

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    all.sort_unstable();
    let expected: Vec<u32> = (0..PRODUCERS * PER_PRODUCER).collect();
    assert_eq!(all, expected);
}

#[tokio::test]
async fn terminate_unblocks_a_waiting_consumer() {
    let queue: Arc<EventQueue<u32>> = Arc::new(EventQueue::default());

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.pop().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.terminate();

    assert_eq!(consumer.await.unwrap(), None);
}
